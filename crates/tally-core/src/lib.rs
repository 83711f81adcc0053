//! # tally-core
//!
//! Foundation crate for the Tally telemetry pipeline.
//! Defines the event model, property values and their validation, the
//! collaborator traits (storage, transport, device), errors, config, and
//! tracing setup. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod event;
pub mod events;
pub mod network;
pub mod tracing;
pub mod traits;
pub mod validation;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use config::TallyConfig;
pub use errors::{TallyError, TallyResult};
pub use event::{BufferedRecord, Event, EventKind, SequenceId};
pub use network::NetworkType;
pub use value::{Properties, Value};
