//! A small Rust client and downloader for the MET Norway Frost API.
//!
//! The crate runs a fixed, sequential pipeline:
//! look up a station, page through its observations, flatten every
//! observation into one row, then write the rows to a CSV file.
//!
//! ## Quick start
//! - Put your Frost client id in a `.frostrc` file (current directory or home
//!   directory) as `client_id: <id>`. Other keys (`start`, `end`, `elements`,
//!   `limit`, `output`, `station`, ...) override the built-in defaults.
//! - Build a [`Client`] and call [`run`].
//! - With `discover: true`, [`discover`] instead lists the county's stations,
//!   keeps those reporting the configured elements and writes them to
//!   `stations_output`.
//!
//! ```no_run
//! use anyhow::Result;
//! use frostapi::{Client, Config, RunOutcome, run};
//!
//! fn main() -> Result<()> {
//!     let cfg = Config::load()?;
//!     let client = Client::from_config(&cfg)?;
//!     if let RunOutcome::Written { path, records, .. } = run(&client, &cfg)? {
//!         println!("{} rows in {}", records, path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Rate-limited requests (HTTP 429) are retried with a `2^attempt` second
//! backoff; every other failure stops the run. A pagination failure after some
//! pages have arrived keeps what was fetched.

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod flatten;
mod observations;
mod pipeline;
mod sink;
mod stations;
mod util;

pub use client::{Client, Endpoint, HttpTransport, Params, RawResponse, Transport};
pub use config::{Config, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT};
pub use error::FrostError;
pub use flatten::{COLUMNS, FlatRecord, flatten};
pub use observations::{
    Fetched, Level, Observation, ObservationFetcher, ObservationQuery, RawBundle, StopReason,
};
pub use pipeline::{DiscoveryOutcome, RunOutcome, discover, run};
pub use sink::{Record, WriteOutcome, write};
pub use stations::{STATION_TYPE, Station, StationCoverage, StationResolver, missing_elements};
