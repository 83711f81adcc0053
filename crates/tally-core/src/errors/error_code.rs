//! Stable error codes for diagnostics hooks.

/// Every error enum implements this to expose a structured code string
/// alongside its message.
pub trait TallyErrorCode {
    /// Returns the error code string (e.g., "VALIDATION_ERROR").
    fn error_code(&self) -> &'static str;

    /// Returns the formatted diagnostic string: `[ERROR_CODE] message`.
    fn diagnostic_string(&self) -> String
    where
        Self: std::fmt::Display,
    {
        format!("[{}] {}", self.error_code(), self)
    }
}

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const MIGRATION_FAILED: &str = "MIGRATION_FAILED";
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
pub const TRANSPORT_TIMEOUT: &str = "TRANSPORT_TIMEOUT";
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
pub const QUEUE_STOPPED: &str = "QUEUE_STOPPED";
pub const TASK_PANICKED: &str = "TASK_PANICKED";
