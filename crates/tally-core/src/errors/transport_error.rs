/// Delivery errors. A failed batch stays in the buffer for the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("collector responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no server url configured")]
    NoServerUrl,
}

impl super::TallyErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => super::error_code::TRANSPORT_TIMEOUT,
            _ => super::error_code::TRANSPORT_ERROR,
        }
    }
}
