use std::path::PathBuf;

use crate::client::{Client, Transport};
use crate::config::Config;
use crate::error::FrostError;
use crate::flatten::flatten;
use crate::observations::{ObservationFetcher, ObservationQuery, StopReason};
use crate::sink::{self, WriteOutcome};
use crate::stations::{StationResolver, missing_elements};

/// How a completed run ended. Hard failures are returned as [`FrostError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Written {
        path: PathBuf,
        station: String,
        records: usize,
        bundles: usize,
        requests: usize,
        /// The fetch stopped on an error after some pages had arrived.
        partial: bool,
    },
    NoStation,
    NoObservations { station: String },
}

/// Resolves a station, fetches every page, flattens and writes the CSV.
pub fn run<T: Transport>(client: &Client<T>, cfg: &Config) -> Result<RunOutcome, FrostError> {
    let resolver = StationResolver::new(client, cfg);

    let station = match &cfg.station {
        Some(id) => id.clone(),
        None => match resolver.resolve_one_station() {
            Ok(Some(s)) => s.id,
            Ok(None) => {
                tracing::warn!("no station found");
                return Ok(RunOutcome::NoStation);
            }
            Err(e) => {
                tracing::error!(error = %e, "no station found: station lookup failed");
                return Err(e);
            }
        },
    };

    if cfg.check_coverage {
        match resolver.available_elements(&station) {
            Ok(available) => {
                for element in missing_elements(&cfg.elements, &available) {
                    tracing::warn!(%station, %element, "station has no time series for element");
                }
            }
            Err(e) => tracing::warn!(%station, error = %e, "could not check element coverage"),
        }
    }

    let query = ObservationQuery::from_config(&station, cfg);
    let fetched = ObservationFetcher::new(client, cfg).fetch_all(&query);

    let partial = match fetched.stop {
        StopReason::Failed(e) if fetched.bundles.is_empty() => {
            tracing::error!(%station, error = %e, "observation fetch failed");
            return Err(e);
        }
        StopReason::Failed(e) => {
            tracing::warn!(
                %station,
                bundles = fetched.bundles.len(),
                error = %e,
                "fetch stopped early, keeping partial data"
            );
            true
        }
        StopReason::Exhausted | StopReason::LastPage => false,
    };

    if fetched.bundles.is_empty() {
        tracing::warn!(%station, "no observations returned");
        return Ok(RunOutcome::NoObservations { station });
    }

    let records = flatten(&fetched.bundles);
    tracing::info!(
        bundles = fetched.bundles.len(),
        records = records.len(),
        "flattened observations"
    );

    match sink::write(&records, &cfg.output)? {
        WriteOutcome::Skipped => Ok(RunOutcome::NoObservations { station }),
        WriteOutcome::Written { path, rows } => Ok(RunOutcome::Written {
            path,
            station,
            records: rows,
            bundles: fetched.bundles.len(),
            requests: fetched.requests,
            partial,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Written {
        path: PathBuf,
        checked: usize,
        kept: usize,
    },
    /// No station passed the coverage filter; no file was written.
    NoMatch { checked: usize },
}

/// Lists every station for the county, keeps those carrying enough of the
/// configured elements and writes them to `stations_output`.
pub fn discover<T: Transport>(
    client: &Client<T>,
    cfg: &Config,
) -> Result<DiscoveryOutcome, FrostError> {
    let resolver = StationResolver::new(client, cfg);
    let stations = resolver.list_stations()?;
    let checked = stations.len();

    let kept = resolver.survey(stations, &cfg.elements, cfg.min_matches, cfg.station_delay)?;
    tracing::info!(checked, kept = kept.len(), "station survey finished");

    match sink::write(&kept, &cfg.stations_output)? {
        WriteOutcome::Skipped => {
            tracing::warn!(checked, "no station carries the requested elements");
            Ok(DiscoveryOutcome::NoMatch { checked })
        }
        WriteOutcome::Written { path, rows } => Ok(DiscoveryOutcome::Written {
            path,
            checked,
            kept: rows,
        }),
    }
}
