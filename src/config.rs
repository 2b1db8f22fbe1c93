use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://frost.met.no";
pub const DEFAULT_API_VERSION: &str = "v0";
pub const DEFAULT_ELEMENTS: &str = "air_temperature,cloud_area_fraction,surface_snow_thickness,mean(surface_downwelling_shortwave_flux_in_air PT1H)";
pub const DEFAULT_PAGE_LIMIT: usize = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;

const RC_FILE: &str = ".frostrc";

/// Keys understood in `.frostrc`.
const RC_KEYS: &[&str] = &[
    "client_id",
    "url",
    "version",
    "start",
    "end",
    "elements",
    "limit",
    "output",
    "station",
    "county",
    "timeresolutions",
    "levels",
    "timeout",
    "max_retries",
    "check_coverage",
    "progress",
    "discover",
    "stations_output",
    "min_matches",
    "station_delay_ms",
];

/// Immutable run configuration, built once at startup and handed to each stage.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frost client id, sent as the basic-auth username with an empty password.
    pub client_id: String,
    /// Base API URL, typically `https://frost.met.no`.
    pub base_url: String,
    /// Versioned path segment, e.g. `v0` in `observations/v0.jsonld`.
    pub api_version: String,
    /// Inclusive start of the reference-time range.
    pub start: String,
    /// Exclusive end of the reference-time range.
    pub end: String,
    /// Comma separated element ids.
    pub elements: String,
    /// Page-size ceiling for the observations endpoint.
    pub page_limit: usize,
    pub output: PathBuf,

    /// Skips station resolution when set.
    pub station: Option<String>,
    pub county: Option<String>,
    pub time_resolution: Option<String>,
    pub levels: Option<String>,

    pub timeout: Duration,
    pub max_retries: u32,
    /// Warn about requested elements the station does not report.
    pub check_coverage: bool,
    pub progress: bool,

    /// List and filter stations instead of downloading observations.
    pub discover: bool,
    pub stations_output: PathBuf,
    /// Requested elements a station must carry to be listed.
    pub min_matches: usize,
    /// Pause between per-station coverage lookups.
    pub station_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            start: "2024-01-01T00:00:00Z".to_string(),
            end: "2024-02-01T00:00:00Z".to_string(),
            elements: DEFAULT_ELEMENTS.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            output: PathBuf::from("frost_observations.csv"),
            station: None,
            county: None,
            time_resolution: Some("PT1H".to_string()),
            levels: None,
            timeout: Duration::from_secs(30),
            max_retries: DEFAULT_MAX_RETRIES,
            check_coverage: false,
            progress: true,
            discover: false,
            stations_output: PathBuf::from("frost_stations.csv"),
            min_matches: 1,
            station_delay: Duration::from_millis(300),
        }
    }
}

impl Config {
    /// Built-in defaults overlaid with the first `.frostrc` found in the
    /// current directory or the home directory.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        for rc_path in rc_candidates() {
            if rc_path.exists() {
                cfg = read_rc(&rc_path, cfg).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;
                break;
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies `key: value` lines on top of `self`.
    pub fn with_rc_text(mut self, text: &str) -> Result<Self> {
        for (key, value) in parse_rc(text) {
            self.apply(&key, &value)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            bail!(
                "Missing configuration: client_id (put `client_id:` in {} in the current or home directory)",
                RC_FILE
            );
        }
        if self.page_limit == 0 {
            bail!("limit must be at least 1");
        }
        if self.start.trim().is_empty() || self.end.trim().is_empty() {
            bail!("both start and end of the reference time range are required");
        }
        if self.elements.trim().is_empty() {
            bail!("elements cannot be empty");
        }
        Ok(())
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let opt = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match key {
            "client_id" => self.client_id = value.to_string(),
            "url" => self.base_url = value.to_string(),
            "version" => self.api_version = value.to_string(),
            "start" => self.start = value.to_string(),
            "end" => self.end = value.to_string(),
            "elements" => self.elements = value.to_string(),
            "limit" => {
                self.page_limit = value
                    .parse()
                    .with_context(|| format!("invalid limit `{}`", value))?
            }
            "output" => self.output = PathBuf::from(value),
            "station" => self.station = opt(value),
            "county" => self.county = opt(value),
            "timeresolutions" => self.time_resolution = opt(value),
            "levels" => self.levels = opt(value),
            "timeout" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("invalid timeout `{}`", value))?;
                self.timeout = Duration::from_secs(secs);
            }
            "max_retries" => {
                self.max_retries = value
                    .parse()
                    .with_context(|| format!("invalid max_retries `{}`", value))?
            }
            "check_coverage" => self.check_coverage = flag(value),
            "progress" => self.progress = flag(value),
            "discover" => self.discover = flag(value),
            "stations_output" => self.stations_output = PathBuf::from(value),
            "min_matches" => {
                self.min_matches = value
                    .parse()
                    .with_context(|| format!("invalid min_matches `{}`", value))?
            }
            "station_delay_ms" => {
                let ms: u64 = value
                    .parse()
                    .with_context(|| format!("invalid station_delay_ms `{}`", value))?;
                self.station_delay = Duration::from_millis(ms);
            }
            _ => tracing::warn!(key, "ignoring unknown configuration key"),
        }
        Ok(())
    }
}

fn flag(v: &str) -> bool {
    !matches!(v, "0" | "false" | "no" | "off")
}

fn read_rc(path: &Path, cfg: Config) -> Result<Config> {
    let text = std::fs::read_to_string(path)?;
    cfg.with_rc_text(&text)
}

fn parse_rc(text: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();

    // A key with an empty value takes its value from the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // URLs and timestamps contain ':', so only a known key ends the wait.
        if let Some(pk) = pending_key.take() {
            if !starts_with_key(line) {
                out.push((pk.to_string(), strip_quotes(line).to_string()));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(k);
            } else {
                out.push((k.to_string(), v.to_string()));
            }
        }
    }

    out
}

fn starts_with_key(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(k, _)| RC_KEYS.contains(&k.trim()))
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(RC_FILE));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(RC_FILE));
    }
    v
}
