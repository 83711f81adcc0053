//! Error handling for Tally.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod error_code;
pub mod storage_error;
pub mod tally_error;
pub mod transport_error;
pub mod validation_error;

pub use config_error::ConfigError;
pub use error_code::TallyErrorCode;
pub use storage_error::StorageError;
pub use tally_error::{TallyError, TallyResult};
pub use transport_error::TransportError;
pub use validation_error::ValidationError;
