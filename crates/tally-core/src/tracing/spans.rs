//! Span definitions per pipeline operation.

/// Create a span around one flush round.
#[macro_export]
macro_rules! flush_span {
    ($trigger:expr, $pending:expr) => {
        ::tracing::info_span!("tally.flush", trigger = ?$trigger, pending = $pending)
    };
}

/// Create a span around one queued unit of work.
#[macro_export]
macro_rules! task_span {
    ($label:expr) => {
        ::tracing::debug_span!("tally.task", label = %$label)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const FLUSH: &str = "tally.flush";
    pub const TASK: &str = "tally.task";
}
