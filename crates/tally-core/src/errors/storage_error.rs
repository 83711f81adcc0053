/// Storage-layer errors for the durable buffer and persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("migration failed at version {version}: {message}")]
    MigrationFailed { version: u32, message: String },

    #[error("failed to serialize {what}: {message}")]
    Serialization { what: &'static str, message: String },

    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },
}

impl super::TallyErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MigrationFailed { .. } => super::error_code::MIGRATION_FAILED,
            _ => super::error_code::STORAGE_ERROR,
        }
    }
}
