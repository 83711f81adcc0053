//! Top-level Tally configuration with layered resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{CollectorConfig, FlushConfig, PrivacyConfig, SessionConfig, StorageConfig};
use crate::constants::{MAX_SESSION_INTERVAL_MS, MIN_FLUSH_INTERVAL_MS, MIN_SESSION_INTERVAL_MS};
use crate::errors::ConfigError;

/// Top-level configuration aggregating all sub-configs.
///
/// Resolution order (highest priority first):
/// 1. Programmatic overrides (applied via `apply_overrides`)
/// 2. Environment variables (`TALLY_*`)
/// 3. Project config (`tally.toml` in the given root)
/// 4. User config (`~/.tally/config.toml`)
/// 5. Compiled defaults
///
/// Values persisted at runtime (bulk size, interval, policy, session
/// interval) take precedence over all of these once the pipeline starts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TallyConfig {
    pub collector: CollectorConfig,
    pub flush: FlushConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub privacy: PrivacyConfig,
}

/// Programmatic overrides, the highest-priority layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub flush_bulk_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub storage_path: Option<PathBuf>,
    pub data_collect_enabled: Option<bool>,
}

impl TallyConfig {
    /// Load configuration with layered resolution rooted at `root`.
    pub fn load(root: &Path, overrides: Option<&ConfigOverrides>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Layer 4 (lowest priority): user config
        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                match Self::merge_toml_file(&mut config, &user_config_path) {
                    Ok(()) => {}
                    Err(e @ ConfigError::ParseError { .. }) => return Err(e),
                    Err(e) => {
                        tracing::warn!("config: ignoring user config: {e}");
                    }
                }
            }
        }

        // Layer 3: project config
        let project_config_path = root.join("tally.toml");
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
        }

        // Layer 2: environment variables
        Self::apply_env_overrides(&mut config);

        // Layer 1 (highest priority): programmatic overrides
        if let Some(o) = overrides {
            Self::apply_overrides(&mut config, o);
        }

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (for testing and embedding).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(config: &TallyConfig) -> Result<(), ConfigError> {
        if config.flush.bulk_size == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "flush.bulk_size".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if let Some(interval) = config.flush.interval_ms {
            if interval < MIN_FLUSH_INTERVAL_MS {
                return Err(ConfigError::ValidationFailed {
                    field: "flush.interval_ms".to_string(),
                    message: format!("must be at least {MIN_FLUSH_INTERVAL_MS}"),
                });
            }
        }
        if config.flush.max_cache_rows == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "flush.max_cache_rows".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if let Some(interval) = config.session.interval_ms {
            if !(MIN_SESSION_INTERVAL_MS..=MAX_SESSION_INTERVAL_MS).contains(&interval) {
                return Err(ConfigError::ValidationFailed {
                    field: "session.interval_ms".to_string(),
                    message: format!(
                        "must be between {MIN_SESSION_INTERVAL_MS} and {MAX_SESSION_INTERVAL_MS}"
                    ),
                });
            }
        }
        if let Some(ref url) = config.collector.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationFailed {
                    field: "collector.server_url".to_string(),
                    message: "must be an http(s) url".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the user config path: `~/.tally/config.toml`.
    fn user_config_path() -> Option<PathBuf> {
        home_dir().map(|h| h.join(".tally").join("config.toml"))
    }

    /// Merge a TOML file into the existing config.
    /// Unknown keys are silently ignored (forward-compatible).
    fn merge_toml_file(config: &mut TallyConfig, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let file_config: TallyConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::merge(config, &file_config);
        Ok(())
    }

    /// Merge `other` into `base`; `other` wins only where it has a value.
    fn merge(base: &mut TallyConfig, other: &TallyConfig) {
        // Collector
        if other.collector.server_url.is_some() {
            base.collector.server_url = other.collector.server_url.clone();
        }
        if other.collector.timeout_ms.is_some() {
            base.collector.timeout_ms = other.collector.timeout_ms;
        }

        // Flush
        if other.flush.bulk_size.is_some() {
            base.flush.bulk_size = other.flush.bulk_size;
        }
        if other.flush.interval_ms.is_some() {
            base.flush.interval_ms = other.flush.interval_ms;
        }
        if other.flush.network_policy.is_some() {
            base.flush.network_policy = other.flush.network_policy;
        }
        if other.flush.max_cache_rows.is_some() {
            base.flush.max_cache_rows = other.flush.max_cache_rows;
        }
        if other.flush.drain_budget_ms.is_some() {
            base.flush.drain_budget_ms = other.flush.drain_budget_ms;
        }

        // Session
        if other.session.interval_ms.is_some() {
            base.session.interval_ms = other.session.interval_ms;
        }

        // Storage
        if other.storage.path.is_some() {
            base.storage.path = other.storage.path.clone();
        }

        // Privacy
        if other.privacy.data_collect_enabled.is_some() {
            base.privacy.data_collect_enabled = other.privacy.data_collect_enabled;
        }
    }

    /// Apply environment variable overrides.
    /// Pattern: `TALLY_SERVER_URL`, `TALLY_FLUSH_BULK_SIZE`, etc.
    fn apply_env_overrides(config: &mut TallyConfig) {
        if let Ok(val) = std::env::var("TALLY_SERVER_URL") {
            config.collector.server_url = Some(val);
        }
        if let Ok(val) = std::env::var("TALLY_FLUSH_BULK_SIZE") {
            if let Ok(v) = val.parse::<usize>() {
                config.flush.bulk_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("TALLY_FLUSH_INTERVAL_MS") {
            if let Ok(v) = val.parse::<u64>() {
                config.flush.interval_ms = Some(v);
            }
        }
        if let Ok(val) = std::env::var("TALLY_MAX_CACHE_ROWS") {
            if let Ok(v) = val.parse::<usize>() {
                config.flush.max_cache_rows = Some(v);
            }
        }
        if let Ok(val) = std::env::var("TALLY_STORAGE_PATH") {
            config.storage.path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("TALLY_DATA_COLLECT_ENABLED") {
            if let Ok(v) = val.parse::<bool>() {
                config.privacy.data_collect_enabled = Some(v);
            }
        }
    }

    /// Apply programmatic overrides (highest priority).
    pub fn apply_overrides(config: &mut TallyConfig, o: &ConfigOverrides) {
        if let Some(ref v) = o.server_url {
            config.collector.server_url = Some(v.clone());
        }
        if let Some(v) = o.flush_bulk_size {
            config.flush.bulk_size = Some(v);
        }
        if let Some(v) = o.flush_interval_ms {
            config.flush.interval_ms = Some(v);
        }
        if let Some(ref v) = o.storage_path {
            config.storage.path = Some(v.clone());
        }
        if let Some(v) = o.data_collect_enabled {
            config.privacy.data_collect_enabled = Some(v);
        }
    }

    /// Serialize the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            path: "<serialization>".to_string(),
            message: e.to_string(),
        })
    }
}

/// Cross-platform home directory resolution.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
