use std::process::ExitCode;

use anyhow::{Context, Result};
use frostapi::{Client, Config, DiscoveryOutcome, RunOutcome, discover, run};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if cfg.discover {
        return match find_stations(&cfg) {
            Ok(DiscoveryOutcome::Written { path, checked, kept }) => {
                tracing::info!(checked, kept, path = %path.display(), "station list written");
                ExitCode::SUCCESS
            }
            Ok(DiscoveryOutcome::NoMatch { checked }) => {
                tracing::warn!(checked, "nothing written: no station matched");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    match download(&cfg) {
        Ok(RunOutcome::Written {
            path,
            station,
            records,
            bundles,
            requests,
            partial,
        }) => {
            tracing::info!(
                %station,
                records,
                bundles,
                requests,
                partial,
                path = %path.display(),
                "download complete"
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::NoStation) => {
            tracing::warn!("nothing downloaded: no station found");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::NoObservations { station }) => {
            tracing::warn!(%station, "nothing downloaded: no observations in range");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn find_stations(cfg: &Config) -> Result<DiscoveryOutcome> {
    tracing::info!(
        county = cfg.county.as_deref().unwrap_or("(any)"),
        elements = %cfg.elements,
        min_matches = cfg.min_matches,
        output = %cfg.stations_output.display(),
        "starting station discovery"
    );
    let client = Client::from_config(cfg)?;
    discover(&client, cfg).context("station discovery failed")
}

fn download(cfg: &Config) -> Result<RunOutcome> {
    tracing::info!(
        url = %cfg.base_url,
        version = %cfg.api_version,
        start = %cfg.start,
        end = %cfg.end,
        elements = %cfg.elements,
        limit = cfg.page_limit,
        output = %cfg.output.display(),
        "starting Frost download"
    );
    let client = Client::from_config(cfg)?;
    run(&client, cfg).context("Frost download failed")
}
