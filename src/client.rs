use anyhow::Context;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::{BoxError, FrostError, first_line};
use crate::util::{backoff, urljoin};

/// Query parameters, in the order they are sent.
pub type Params = Vec<(String, String)>;

/// Frost resources used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Sources,
    Observations,
    AvailableTimeSeries,
}

impl Endpoint {
    pub fn path(self, version: &str) -> String {
        match self {
            Self::Sources => format!("sources/{}.jsonld", version),
            Self::Observations => format!("observations/{}.jsonld", version),
            Self::AvailableTimeSeries => {
                format!("observations/availableTimeSeries/{}.jsonld", version)
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sources => "sources",
            Self::Observations => "observations",
            Self::AvailableTimeSeries => "availableTimeSeries",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The network layer under [`Client`].
///
/// Errors returned here are connection-level failures (DNS, refused, timeout);
/// any response from the server, whatever its status, is a `RawResponse`.
pub trait Transport {
    fn get(&self, url: &str, params: &Params, username: &str) -> Result<RawResponse, BoxError>;
}

/// Blocking `reqwest` transport with basic auth and a fixed timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("frostapi-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("frostapi-rs")),
        );

        let http = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, params: &Params, username: &str) -> Result<RawResponse, BoxError> {
        let resp = self
            .http
            .get(url)
            .query(params)
            .basic_auth(username, Some(""))
            .send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok(RawResponse { status, body })
    }
}

type Sleeper = Box<dyn Fn(Duration)>;

/// Authenticated Frost API client.
///
/// Rate-limited requests are retried with exponential backoff; every other
/// failure is returned to the caller on the first occurrence.
pub struct Client<T = HttpTransport> {
    base_url: String,
    version: String,
    client_id: String,
    max_retries: u32,
    transport: T,
    sleep: Sleeper,
}

impl Client<HttpTransport> {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(cfg.timeout)?;
        Ok(Self::with_transport(cfg, transport))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(cfg: &Config, transport: T) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            version: cfg.api_version.clone(),
            client_id: cfg.client_id.clone(),
            max_retries: cfg.max_retries,
            transport,
            sleep: Box::new(thread::sleep),
        }
    }

    /// Replaces the function used to wait between rate-limited attempts.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Waits `delay` with the client's sleeper; zero is a no-op.
    pub fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            (self.sleep)(delay);
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        urljoin(&self.base_url, &endpoint.path(&self.version))
    }

    /// GETs `endpoint` and returns the decoded top-level object, which is
    /// guaranteed to carry a `data` field.
    pub fn request(&self, endpoint: Endpoint, params: &Params) -> Result<Value, FrostError> {
        let url = self.url(endpoint);
        let mut attempt: u32 = 0;

        loop {
            tracing::info!(%endpoint, attempt = attempt + 1, "requesting");

            let resp = self
                .transport
                .get(&url, params, &self.client_id)
                .map_err(|source| {
                    tracing::error!(%endpoint, error = %source, "transport failure");
                    FrostError::Transport {
                        endpoint: endpoint.to_string(),
                        source,
                    }
                })?;

            match resp.status {
                200..=299 => return parse_body(endpoint, &resp.body),
                429 => {
                    if attempt >= self.max_retries {
                        tracing::error!(%endpoint, retries = attempt, "rate limit retries exhausted");
                        return Err(FrostError::RateLimited {
                            endpoint: endpoint.to_string(),
                            retries: attempt,
                        });
                    }
                    let delay = backoff(attempt);
                    tracing::warn!(%endpoint, delay_secs = delay.as_secs(), "rate limited, backing off");
                    (self.sleep)(delay);
                    attempt += 1;
                }
                401 | 403 => {
                    tracing::error!(%endpoint, status = resp.status, "authentication rejected");
                    return Err(FrostError::Auth {
                        endpoint: endpoint.to_string(),
                        status: resp.status,
                    });
                }
                status => {
                    let detail = first_line(&resp.body).to_string();
                    tracing::error!(%endpoint, status, %detail, "request failed");
                    return Err(FrostError::Status {
                        endpoint: endpoint.to_string(),
                        status,
                        detail,
                    });
                }
            }
        }
    }
}

fn parse_body(endpoint: Endpoint, body: &str) -> Result<Value, FrostError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        tracing::error!(%endpoint, error = %e, "malformed JSON body");
        FrostError::Transport {
            endpoint: endpoint.to_string(),
            source: Box::new(e),
        }
    })?;

    if value.get("data").is_none() {
        tracing::error!(%endpoint, "response has no `data` field");
        return Err(FrostError::Protocol {
            endpoint: endpoint.to_string(),
            reason: "missing top-level `data` field".to_string(),
        });
    }
    Ok(value)
}

/// Decodes the `data` field of a response returned by [`Client::request`].
pub(crate) fn decode_data<D: serde::de::DeserializeOwned>(
    endpoint: Endpoint,
    mut value: Value,
) -> Result<D, FrostError> {
    let data = value.get_mut("data").map(Value::take).unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| FrostError::Protocol {
        endpoint: endpoint.to_string(),
        reason: format!("cannot decode `data`: {}", e),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::{client, reply};
    use super::*;

    #[test]
    fn endpoint_paths_are_versioned() {
        assert_eq!(Endpoint::Sources.path("v0"), "sources/v0.jsonld");
        assert_eq!(Endpoint::Observations.path("v1"), "observations/v1.jsonld");
        assert_eq!(
            Endpoint::AvailableTimeSeries.path("v0"),
            "observations/availableTimeSeries/v0.jsonld"
        );
    }

    #[test]
    fn success_returns_object_and_sends_credential() {
        let (c, slept) = client(vec![reply(200, r#"{"data":[{"id":"SN1"}]}"#)]);
        let params = vec![("types".to_string(), "SensorSystem".to_string())];
        let value = c.request(Endpoint::Sources, &params).unwrap();

        assert_eq!(value["data"][0]["id"], "SN1");
        let seen = c.transport().seen.borrow();
        assert_eq!(seen[0].0, "https://frost.test/sources/v0.jsonld");
        assert_eq!(seen[0].1, params);
        assert_eq!(seen[0].2, "client-id");
        assert!(slept.borrow().is_empty());
    }

    #[test]
    fn rate_limit_backs_off_exponentially_then_fails() {
        let (c, slept) = client((0..6).map(|_| reply(429, "slow down")).collect());
        let err = c.request(Endpoint::Observations, &Vec::new()).unwrap_err();

        assert!(matches!(err, FrostError::RateLimited { retries: 5, .. }));
        let secs: Vec<u64> = slept.borrow().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
        assert_eq!(c.transport().requests(), 6);
    }

    #[test]
    fn retry_budget_is_configurable() {
        let (c, slept) = client((0..3).map(|_| reply(429, "")).collect());
        let c = c.with_max_retries(1);
        let err = c.request(Endpoint::Observations, &Vec::new()).unwrap_err();

        assert!(matches!(err, FrostError::RateLimited { retries: 1, .. }));
        assert_eq!(c.transport().requests(), 2);
        assert_eq!(slept.borrow().len(), 1);
    }

    #[test]
    fn rate_limit_recovers_on_retry() {
        let (c, slept) = client(vec![
            reply(429, ""),
            reply(429, ""),
            reply(200, r#"{"data":[]}"#),
        ]);
        assert!(c.request(Endpoint::Observations, &Vec::new()).is_ok());
        assert_eq!(slept.borrow().len(), 2);
    }

    #[test]
    fn forbidden_is_not_retried() {
        let (c, slept) = client(vec![reply(403, "forbidden"), reply(200, r#"{"data":[]}"#)]);
        let err = c.request(Endpoint::Observations, &Vec::new()).unwrap_err();

        assert!(matches!(err, FrostError::Auth { status: 403, .. }));
        assert_eq!(c.transport().requests(), 1);
        assert!(slept.borrow().is_empty());
    }

    #[test]
    fn unauthorized_is_auth_error() {
        let (c, _) = client(vec![reply(401, "")]);
        let err = c.request(Endpoint::Sources, &Vec::new()).unwrap_err();
        assert!(matches!(err, FrostError::Auth { status: 401, .. }));
    }

    #[test]
    fn server_error_keeps_first_body_line() {
        let (c, _) = client(vec![reply(500, "\ninternal error\nstack trace...")]);
        let err = c.request(Endpoint::Observations, &Vec::new()).unwrap_err();
        match err {
            FrostError::Status { status, detail, .. } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "internal error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(c.transport().requests(), 1);
    }

    #[test]
    fn connection_failure_is_transport_error() {
        let (c, _) = client(vec![Err("connection refused".into())]);
        let err = c.request(Endpoint::Sources, &Vec::new()).unwrap_err();
        assert!(matches!(err, FrostError::Transport { .. }));
        assert_eq!(c.transport().requests(), 1);
    }

    #[test]
    fn malformed_json_is_transport_error() {
        let (c, _) = client(vec![reply(200, "<html>oops</html>")]);
        let err = c.request(Endpoint::Sources, &Vec::new()).unwrap_err();
        assert!(matches!(err, FrostError::Transport { .. }));
    }

    #[test]
    fn missing_data_is_protocol_error() {
        let (c, _) = client(vec![reply(200, r#"{"error":{"reason":"no"}}"#)]);
        let err = c.request(Endpoint::Sources, &Vec::new()).unwrap_err();
        assert!(matches!(err, FrostError::Protocol { .. }));
    }

    #[test]
    fn decode_data_rejects_wrong_shape() {
        let value = serde_json::json!({"data": "not a list"});
        let res: Result<Vec<Value>, _> = decode_data(Endpoint::Sources, value);
        assert!(matches!(res, Err(FrostError::Protocol { .. })));
    }
}
