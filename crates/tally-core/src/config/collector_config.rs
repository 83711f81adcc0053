//! Collector endpoint configuration.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TIMEOUT_MS;

/// Where batches are delivered.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CollectorConfig {
    /// Collector URL. Flushing is skipped while unset.
    pub server_url: Option<String>,
    /// Per-request timeout in milliseconds. Default: 30000.
    pub timeout_ms: Option<u64>,
}

impl CollectorConfig {
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}
