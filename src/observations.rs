use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Deserializer};

use crate::client::{Client, Endpoint, Params, Transport, decode_data};
use crate::config::Config;
use crate::error::FrostError;
use crate::util::reference_time;

/// Observations sharing a source and reference time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBundle {
    pub source_id: String,
    pub reference_time: String,
    #[serde(default)]
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub element_id: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub time_offset: Option<String>,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub exposure_category: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub performance_category: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub quality_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    #[serde(default)]
    pub level_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

// Frost sends categories and quality codes as "2" on some sources and 2 on others.
fn text_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(d)?.map(|r| match r {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    }))
}

// Log lines share stderr with the spinner, so the bar is hidden while they print.
fn suspended<R>(pb: &Option<ProgressBar>, f: impl FnOnce() -> R) -> R {
    match pb {
        Some(pb) => pb.suspend(f),
        None => f(),
    }
}

/// What a single observations query asks for.
#[derive(Debug, Clone)]
pub struct ObservationQuery {
    pub station_id: String,
    pub elements: String,
    pub start: String,
    pub end: String,
    pub time_resolution: Option<String>,
    pub levels: Option<String>,
}

impl ObservationQuery {
    pub fn from_config(station_id: &str, cfg: &Config) -> Self {
        Self {
            station_id: station_id.to_string(),
            elements: cfg.elements.clone(),
            start: cfg.start.clone(),
            end: cfg.end.clone(),
            time_resolution: cfg.time_resolution.clone(),
            levels: cfg.levels.clone(),
        }
    }

    fn params(&self, offset: usize, limit: usize) -> Params {
        let mut p: Params = vec![
            ("sources".into(), self.station_id.clone()),
            ("elements".into(), self.elements.clone()),
            ("referencetime".into(), reference_time(&self.start, &self.end)),
        ];
        if let Some(res) = &self.time_resolution {
            p.push(("timeresolutions".into(), res.clone()));
        }
        if let Some(levels) = &self.levels {
            p.push(("levels".into(), levels.clone()));
        }
        p.push(("offset".into(), offset.to_string()));
        p.push(("limit".into(), limit.to_string()));
        p
    }
}

/// Why the pagination loop ended.
#[derive(Debug)]
pub enum StopReason {
    /// A page came back empty.
    Exhausted,
    /// A page came back shorter than the limit.
    LastPage,
    /// A request failed; bundles gathered before it are kept.
    Failed(FrostError),
}

#[derive(Debug)]
pub struct Fetched {
    pub bundles: Vec<RawBundle>,
    pub requests: usize,
    pub stop: StopReason,
}

pub struct ObservationFetcher<'a, T: Transport> {
    client: &'a Client<T>,
    limit: usize,
    progress: bool,
}

impl<'a, T: Transport> ObservationFetcher<'a, T> {
    pub fn new(client: &'a Client<T>, cfg: &Config) -> Self {
        Self {
            client,
            limit: cfg.page_limit.max(1),
            progress: cfg.progress,
        }
    }

    /// Pages through the observations endpoint until an empty or short page,
    /// or the first failure.
    pub fn fetch_all(&self, query: &ObservationQuery) -> Fetched {
        let pb = self.progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        });

        let mut bundles = Vec::new();
        let mut offset = 0usize;
        let mut requests = 0usize;

        let stop = loop {
            requests += 1;
            let page = suspended(&pb, || {
                self.client
                    .request(Endpoint::Observations, &query.params(offset, self.limit))
                    .and_then(|v| decode_data::<Vec<RawBundle>>(Endpoint::Observations, v))
            });

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    suspended(&pb, || {
                        tracing::warn!(offset, kept = bundles.len(), error = %e, "stopping pagination")
                    });
                    break StopReason::Failed(e);
                }
            };

            if page.is_empty() {
                break StopReason::Exhausted;
            }

            let n = page.len();
            bundles.extend(page);
            suspended(&pb, || {
                tracing::info!(offset, page = n, total = bundles.len(), "fetched page")
            });
            if let Some(pb) = &pb {
                pb.set_message(format!("{} pages, {} bundles", requests, bundles.len()));
                pb.tick();
            }

            if n < self.limit {
                break StopReason::LastPage;
            }
            offset += self.limit;
        };

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        Fetched {
            bundles,
            requests,
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{client, config, reply};
    use crate::client::RawResponse;
    use crate::config::DEFAULT_PAGE_LIMIT;

    fn page(offset: usize, n: usize) -> Result<RawResponse, String> {
        let items: Vec<String> = (offset..offset + n)
            .map(|i| {
                format!(
                    r#"{{"sourceId":"SN1:0","referenceTime":"2024-01-01T{:02}:00:00.000Z","observations":[{{"elementId":"air_temperature","value":{}.5,"unit":"degC","timeOffset":"PT0H"}}]}}"#,
                    i % 24,
                    i
                )
            })
            .collect();
        reply(200, &format!(r#"{{"data":[{}]}}"#, items.join(",")))
    }

    fn offsets(c: &Client<crate::client::testing::Scripted>) -> Vec<String> {
        c.transport()
            .seen
            .borrow()
            .iter()
            .map(|(_, p, _)| {
                p.iter()
                    .find(|(k, _)| k == "offset")
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    fn fetch(limit: usize, c: &Client<crate::client::testing::Scripted>) -> Fetched {
        let cfg = Config {
            page_limit: limit,
            progress: false,
            ..config()
        };
        ObservationFetcher::new(c, &cfg).fetch_all(&ObservationQuery::from_config("SN1", &cfg))
    }

    #[test]
    fn spinner_does_not_change_the_result() {
        let (c, _) = client(vec![page(0, 2), page(2, 1)]);
        let cfg = Config {
            page_limit: 2,
            progress: true,
            ..config()
        };
        let got = ObservationFetcher::new(&c, &cfg)
            .fetch_all(&ObservationQuery::from_config("SN1", &cfg));

        assert_eq!(got.bundles.len(), 3);
        assert_eq!(got.requests, 2);
        assert!(matches!(got.stop, StopReason::LastPage));
    }

    #[test]
    fn short_page_ends_pagination() {
        let (c, _) = client(vec![page(0, 2), page(2, 2), page(4, 1)]);
        let got = fetch(2, &c);

        assert_eq!(got.bundles.len(), 5);
        assert_eq!(got.requests, 3);
        assert!(matches!(got.stop, StopReason::LastPage));
        assert_eq!(offsets(&c), vec!["0", "2", "4"]);
        assert_eq!(got.bundles[4].reference_time, "2024-01-01T04:00:00.000Z");
    }

    #[test]
    fn full_last_page_needs_one_empty_page() {
        let (c, _) = client(vec![page(0, 2), page(2, 2), reply(200, r#"{"data":[]}"#)]);
        let got = fetch(2, &c);

        assert_eq!(got.bundles.len(), 4);
        assert!(matches!(got.stop, StopReason::Exhausted));
        // ceil(4 / 2) + 1 requests, never past offset 4.
        assert_eq!(offsets(&c), vec!["0", "2", "4"]);
    }

    #[test]
    fn empty_first_page_is_exhausted() {
        let (c, _) = client(vec![reply(200, r#"{"data":[]}"#)]);
        let got = fetch(10, &c);
        assert!(got.bundles.is_empty());
        assert_eq!(got.requests, 1);
        assert!(matches!(got.stop, StopReason::Exhausted));
    }

    #[test]
    fn failure_keeps_earlier_pages() {
        let (c, _) = client(vec![page(0, 3), reply(500, "boom")]);
        let got = fetch(3, &c);

        assert_eq!(got.bundles.len(), 3);
        assert!(matches!(got.stop, StopReason::Failed(FrostError::Status { status: 500, .. })));
    }

    #[test]
    fn query_parameters_are_sent() {
        let (c, _) = client(vec![reply(200, r#"{"data":[]}"#)]);
        let cfg = Config {
            elements: "air_temperature,wind_speed".into(),
            start: "2024-01-01".into(),
            end: "2024-01-02".into(),
            levels: Some("default".into()),
            progress: false,
            ..config()
        };
        ObservationFetcher::new(&c, &cfg).fetch_all(&ObservationQuery::from_config("SN9", &cfg));

        let seen = c.transport().seen.borrow();
        let params = &seen[0].1;
        assert_eq!(seen[0].0, "https://frost.test/observations/v0.jsonld");
        assert!(params.contains(&("sources".into(), "SN9".into())));
        assert!(params.contains(&("elements".into(), "air_temperature,wind_speed".into())));
        assert!(params.contains(&("referencetime".into(), "2024-01-01/2024-01-02".into())));
        assert!(params.contains(&("timeresolutions".into(), "PT1H".into())));
        assert!(params.contains(&("levels".into(), "default".into())));
        assert!(params.contains(&("limit".into(), DEFAULT_PAGE_LIMIT.to_string())));
    }

    #[test]
    fn observation_fields_decode() {
        let json = r#"{
            "elementId": "air_temperature",
            "value": -3.2,
            "unit": "degC",
            "level": {"levelType": "height_above_ground", "unit": "m", "value": 2},
            "timeOffset": "PT0H",
            "exposureCategory": "2",
            "performanceCategory": 3,
            "qualityCode": 0
        }"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.value, Some(-3.2));
        assert_eq!(obs.level.and_then(|l| l.value), Some(2.0));
        assert_eq!(obs.exposure_category.as_deref(), Some("2"));
        assert_eq!(obs.performance_category.as_deref(), Some("3"));
        assert_eq!(obs.quality_code.as_deref(), Some("0"));
    }

    #[test]
    fn quality_code_may_be_text() {
        let json = r#"{"elementId": "air_temperature", "value": 1.0, "qualityCode": "2"}"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.quality_code.as_deref(), Some("2"));

        let json = r#"{"elementId": "air_temperature", "qualityCode": null}"#;
        let obs: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(obs.quality_code, None);
    }
}
