use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SESSION_INTERVAL_MS;

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Session interval in milliseconds, 10000..=300000. Default: 30000.
    pub interval_ms: Option<u64>,
}

impl SessionConfig {
    pub fn effective_interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(DEFAULT_SESSION_INTERVAL_MS)
    }
}
