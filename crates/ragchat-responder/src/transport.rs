use std::thread;
use std::time::Duration;

use ragchat_core::{Error, Result};
use reqwest::blocking::{Client, Response};
use serde_json::Value;
use tracing::{debug, warn};

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Timeout from configured seconds; unset or non-finite values use the
/// default, anything below one second is raised to one second.
pub(crate) fn timeout_from_secs(secs: Option<f64>) -> Duration {
    match secs {
        Some(s) if s.is_finite() && s > 0.0 => Duration::from_secs_f64(s).max(MIN_TIMEOUT),
        Some(_) => MIN_TIMEOUT,
        None => DEFAULT_TIMEOUT,
    }
}

/// JSON-over-HTTP POST with an optional bearer token.
///
/// A request that times out is sent once more after a short backoff. Any
/// other transport failure, a non-2xx status or a body that is not JSON is
/// reported as [`Error::Provider`].
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    client: Client,
}

impl Transport {
    pub(crate) fn new(endpoint: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::provider(format!("Failed to build HTTP client: {e}")))?;
        let token = token.filter(|t| !t.trim().is_empty());
        Ok(Self { endpoint, token, timeout, client })
    }

    pub(crate) fn endpoint(&self) -> &str { &self.endpoint }

    pub(crate) fn token(&self) -> Option<&str> { self.token.as_deref() }

    pub(crate) fn timeout(&self) -> Duration { self.timeout }

    pub(crate) fn post_json(&self, payload: &Value) -> Result<Value> {
        let response = self.send_with_retry(payload)?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::provider(format!("Failed to read chat service response: {e}")))?;
        if !status.is_success() {
            return Err(Error::provider(format!(
                "Chat service returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::provider(format!("Chat service returned an invalid payload: {e}")))
    }

    fn send_with_retry(&self, payload: &Value) -> Result<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.post(&self.endpoint).json(payload);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            debug!(endpoint = %self.endpoint, attempt, "posting chat request");
            match request.send() {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS => {
                    warn!(endpoint = %self.endpoint, attempt, "chat request timed out, retrying");
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(e) => {
                    return Err(Error::provider(format!("Failed to contact chat service: {e}")));
                }
            }
        }
    }
}
