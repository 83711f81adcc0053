//! Validation errors for event names, property keys, and values.

use super::error_code::{self, TallyErrorCode};

/// Rejection of a single property, event name, or identifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long: {len} chars, max {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid key `{key}`: must match [a-zA-Z_$][a-zA-Z0-9_$]{{0,99}}")]
    InvalidKey { key: String },

    #[error("key `{key}` is reserved")]
    ReservedKey { key: String },

    #[error("property `{key}`: string value too long ({len} chars, max {max})")]
    ValueTooLong { key: String, len: usize, max: usize },

    #[error("property `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl TallyErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        error_code::VALIDATION_ERROR
    }
}
