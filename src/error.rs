use std::path::PathBuf;

use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure kinds surfaced by the Frost client, the fetch stages and the sink.
#[derive(Debug, Error)]
pub enum FrostError {
    #[error("Frost authentication failed (HTTP {status}) on {endpoint}; check the client id")]
    Auth { endpoint: String, status: u16 },

    #[error("Frost rate limit still in effect on {endpoint} after {retries} retries")]
    RateLimited { endpoint: String, retries: u32 },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    #[error("Frost request failed: HTTP {status} on {endpoint}: {detail}")]
    Status {
        endpoint: String,
        status: u16,
        detail: String,
    },

    #[error("unexpected response from {endpoint}: {reason}")]
    Protocol { endpoint: String, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "record {row} has {values} value(s) for columns [{}], expected [{}]",
        found.join(", "),
        expected.join(", ")
    )]
    SchemaMismatch {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
        values: usize,
    },
}

impl FrostError {
    /// Whether the failure came from rate limiting rather than a hard error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: csv::Error) -> Self {
        let source = match err.into_kind() {
            csv::ErrorKind::Io(e) => e,
            other => std::io::Error::other(format!("{:?}", other)),
        };
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// First non-empty line of an error body, trimmed for log output.
pub(crate) fn first_line(body: &str) -> &str {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("(empty body)")
}
