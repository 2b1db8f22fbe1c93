use std::time::Duration;

/// Delay before retrying a rate-limited request: `2^attempt` seconds.
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(32))
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Builds the `start/end` string Frost expects for `referencetime`.
pub(crate) fn reference_time(start: &str, end: &str) -> String {
    format!("{}/{}", start.trim(), end.trim())
}
