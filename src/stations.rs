use std::collections::BTreeSet;
use std::time::Duration;

use crate::client::{Client, Endpoint, Params, Transport, decode_data};
use crate::config::Config;
use crate::error::FrostError;
use crate::sink::Record;

/// Station type queried when looking up a source.
pub const STATION_TYPE: &str = "SensorSystem";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<f64>,
}

impl Station {
    /// `(longitude, latitude)` when the source carries a point geometry.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match self.geometry.as_ref()?.coordinates.as_slice() {
            [lon, lat, ..] => Some((*lon, *lat)),
            _ => None,
        }
    }
}

/// A station together with the requested elements it reports.
#[derive(Debug, Clone)]
pub struct StationCoverage {
    pub station: Station,
    pub matched: Vec<String>,
}

const COVERAGE_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "longitude",
    "latitude",
    "county",
    "country",
    "matchedElements",
    "matchCount",
];

impl Record for StationCoverage {
    fn keys(&self) -> Vec<String> {
        COVERAGE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn values(&self) -> Vec<String> {
        let s = &self.station;
        let (lon, lat) = s
            .coordinates()
            .map(|(lon, lat)| (lon.to_string(), lat.to_string()))
            .unwrap_or_default();
        vec![
            s.id.clone(),
            s.name.clone().unwrap_or_default(),
            lon,
            lat,
            s.county.clone().unwrap_or_default(),
            s.country.clone().unwrap_or_default(),
            self.matched.join(", "),
            self.matched.len().to_string(),
        ]
    }
}

#[derive(Debug, serde::Deserialize)]
struct TimeSeries {
    #[serde(rename = "elementId")]
    element_id: String,
}

pub struct StationResolver<'a, T: Transport> {
    client: &'a Client<T>,
    county: Option<String>,
}

impl<'a, T: Transport> StationResolver<'a, T> {
    pub fn new(client: &'a Client<T>, cfg: &Config) -> Self {
        Self {
            client,
            county: cfg.county.clone(),
        }
    }

    fn source_params(&self) -> Params {
        let mut params: Params = vec![("types".into(), STATION_TYPE.into())];
        if let Some(county) = &self.county {
            params.push(("county".into(), county.clone()));
        }
        params
    }

    /// Looks up a single sensor-system station.
    ///
    /// `Ok(None)` means the query succeeded but matched nothing.
    pub fn resolve_one_station(&self) -> Result<Option<Station>, FrostError> {
        let mut params = self.source_params();
        params.push(("limit".into(), "1".into()));

        let value = self.client.request(Endpoint::Sources, &params)?;
        let stations: Vec<Station> = decode_data(Endpoint::Sources, value)?;
        let station = stations.into_iter().next();

        match &station {
            Some(s) => tracing::info!(
                id = %s.id,
                name = s.name.as_deref().unwrap_or("?"),
                "resolved station"
            ),
            None => tracing::warn!("sources query returned no station"),
        }
        Ok(station)
    }

    /// Every sensor-system station matching the county filter.
    pub fn list_stations(&self) -> Result<Vec<Station>, FrostError> {
        let value = self.client.request(Endpoint::Sources, &self.source_params())?;
        let stations: Vec<Station> = decode_data(Endpoint::Sources, value)?;
        tracing::info!(count = stations.len(), "listed stations");
        Ok(stations)
    }

    /// Checks each station's available time series and keeps those reporting
    /// at least `min_matches` of the `requested` elements.
    ///
    /// A station whose lookup fails is skipped, except for authentication and
    /// rate-limit failures, which stop the survey.
    pub fn survey(
        &self,
        stations: Vec<Station>,
        requested: &str,
        min_matches: usize,
        delay: Duration,
    ) -> Result<Vec<StationCoverage>, FrostError> {
        let total = stations.len();
        let mut kept = Vec::new();

        for (idx, station) in stations.into_iter().enumerate() {
            if idx > 0 {
                self.client.pause(delay);
            }

            let available = match self.available_elements(&station.id) {
                Ok(available) => available,
                Err(e @ (FrostError::Auth { .. } | FrostError::RateLimited { .. })) => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(id = %station.id, error = %e, "skipping station");
                    continue;
                }
            };

            let matched: Vec<String> = requested
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty() && available.contains(*e))
                .map(str::to_string)
                .collect();

            tracing::info!(
                id = %station.id,
                checked = idx + 1,
                total,
                matched = matched.len(),
                "checked station"
            );
            if !matched.is_empty() && matched.len() >= min_matches {
                kept.push(StationCoverage { station, matched });
            }
        }

        Ok(kept)
    }

    /// Element ids for which `station_id` has time series available.
    pub fn available_elements(&self, station_id: &str) -> Result<BTreeSet<String>, FrostError> {
        let params: Params = vec![("sources".into(), station_id.to_string())];
        let value = self.client.request(Endpoint::AvailableTimeSeries, &params)?;
        let series: Vec<TimeSeries> = decode_data(Endpoint::AvailableTimeSeries, value)?;
        Ok(series.into_iter().map(|s| s.element_id).collect())
    }
}

/// Requested elements (comma separated) that are absent from `available`.
pub fn missing_elements(requested: &str, available: &BTreeSet<String>) -> Vec<String> {
    requested
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty() && !available.contains(*e))
        .map(str::to_string)
        .collect()
}
