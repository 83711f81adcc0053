//! Blocking HTTP transport (feature `http`).

use std::time::Duration;

use tally_core::constants::DEFAULT_TIMEOUT_MS;
use tally_core::errors::TransportError;
use tally_core::traits::Transport;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Collector endpoint; batches are POSTed here.
    pub server_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// POSTs each batch as a JSON array. Any non-2xx status is a failure.
/// No retries: a failed batch stays buffered for the next flush trigger.
#[derive(Debug)]
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        if config.server_url.is_empty() {
            return Err(TransportError::NoServerUrl);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Network {
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }
}

impl Transport for HttpTransport {
    fn upload(&self, batch: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.config.server_url)
            .header("Content-Type", "application/json")
            .body(batch.to_string())
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Network {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
