//! Tracing initialization and configuration.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the Tally tracing/logging system.
///
/// Reads the `TALLY_LOG` environment variable for per-module log levels.
/// Format: `TALLY_LOG=tally_pipeline::flush=debug,tally_storage=warn`
///
/// Falls back to `tally=info` if `TALLY_LOG` is not set or is invalid.
///
/// Idempotent. If the host already installed a global subscriber this
/// leaves it in place.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("tally=info"));
        install(filter);
    });
}

/// Initialize tracing with a custom filter string (for testing or embedding).
pub fn init_tracing_with_filter(filter: &str) {
    let filter = EnvFilter::new(filter);
    INIT.call_once(|| install(filter));
}

fn install(filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init();
}
