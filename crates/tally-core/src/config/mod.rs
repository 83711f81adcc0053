//! Configuration system for Tally.
//! TOML-based, layered resolution: overrides > env > project > user > defaults.

pub mod collector_config;
pub mod flush_config;
pub mod privacy_config;
pub mod session_config;
pub mod storage_config;
pub mod tally_config;

pub use collector_config::CollectorConfig;
pub use flush_config::FlushConfig;
pub use privacy_config::PrivacyConfig;
pub use session_config::SessionConfig;
pub use storage_config::StorageConfig;
pub use tally_config::{ConfigOverrides, TallyConfig};
