//! Aggregate error for units of work running on the task queue.

use super::error_code::{self, TallyErrorCode};
use super::{ConfigError, StorageError, TransportError, ValidationError};

/// Any error a pipeline operation can produce.
/// Aggregates subsystem errors via `From` conversions.
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task queue is stopped")]
    QueueStopped,

    #[error("Task panicked: {message}")]
    TaskPanicked { message: String },
}

impl TallyErrorCode for TallyError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
            Self::Transport(e) => e.error_code(),
            Self::Config(e) => e.error_code(),
            Self::QueueStopped => error_code::QUEUE_STOPPED,
            Self::TaskPanicked { .. } => error_code::TASK_PANICKED,
        }
    }
}

/// Convenience alias used across the workspace.
pub type TallyResult<T> = Result<T, TallyError>;
