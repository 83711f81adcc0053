//! Default transports.
//!
//! The pipeline only needs [`tally_core::traits::Transport`]; hosts bring
//! their own or enable the `http` feature for a blocking HTTP POST client.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig};

use std::sync::Arc;

use tally_core::traits::Transport;
use tally_core::TallyConfig;

/// Transport derived from config, if one can be built.
///
/// Without the `http` feature there is no built-in transport and flushing
/// is skipped until the host supplies one.
pub fn from_config(config: &TallyConfig) -> Option<Arc<dyn Transport>> {
    let url = config.collector.server_url.as_deref()?;

    #[cfg(feature = "http")]
    {
        let http_config = HttpTransportConfig {
            server_url: url.to_string(),
            timeout: std::time::Duration::from_millis(config.collector.effective_timeout_ms()),
        };
        match HttpTransport::new(http_config) {
            Ok(t) => Some(Arc::new(t) as Arc<dyn Transport>),
            Err(e) => {
                tracing::error!("transport: {e}");
                None
            }
        }
    }

    #[cfg(not(feature = "http"))]
    {
        tracing::warn!(
            server_url = url,
            "transport: server url configured but the `http` feature is off; supply a transport"
        );
        None
    }
}
