use serde::{Deserialize, Serialize};

/// Consent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Whether data collection is consented at start. Default: true.
    /// When false, queued work is held until `enable_data_collect`.
    pub data_collect_enabled: Option<bool>,
}

impl PrivacyConfig {
    pub fn effective_data_collect_enabled(&self) -> bool {
        self.data_collect_enabled.unwrap_or(true)
    }
}
