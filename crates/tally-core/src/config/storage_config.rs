use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Durable storage location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. In-memory when unset (events do not survive restart).
    pub path: Option<PathBuf>,
}
