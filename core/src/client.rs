use crate::error::FetchError;
use serde_json::Value;
use std::time::Duration;

/// Patent search endpoint.
pub const API_ENDPOINT: &str = "https://api.patentsview.org/patents/query";

/// Status line of one HTTP exchange plus the raw body text. On failure paths
/// the body is not guaranteed to be JSON, so it stays a string until the
/// fetcher decides to parse it.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One POST of a JSON payload. Implementations only report what came back;
/// retrying is the fetcher's job. `Err` is reserved for connection-level
/// failures where there is no status line to read.
pub trait Transport {
    fn send(&self, payload: &Value) -> Result<HttpResponse, FetchError>;
}

/// Production transport over a blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoint(API_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: &Value) -> Result<HttpResponse, FetchError> {
        let resp = self.client.post(&self.endpoint).json(payload).send()?;
        let status = resp.status();
        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            body: resp.text()?,
        })
    }
}

/// How a failed page request is handled.
///
/// `max_retries: None` retries forever, which is the historical behavior;
/// callers that want a bound opt in explicitly.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub automatic: bool,
    pub delay: Duration,
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Wait `delay` and reissue without asking.
    pub fn automatic(delay: Duration) -> Self {
        Self {
            automatic: true,
            delay,
            max_retries: None,
        }
    }

    /// Consult the caller-supplied confirm hook before each reissue.
    pub fn interactive() -> Self {
        Self {
            automatic: false,
            delay: Duration::from_secs(1),
            max_retries: None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::interactive()
    }
}
