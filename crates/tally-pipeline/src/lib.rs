//! # tally-pipeline
//!
//! The event buffering and delivery engine. Callers use [`Tally`]; every
//! stateful mutation runs on one worker thread owned by the [`TaskQueue`],
//! which appends to the durable buffer and drives the flush protocol.

pub mod client;
pub mod engine;
pub mod flush;
pub mod identity;
pub mod policy;
pub mod properties;
pub mod queue;
pub mod registry;
pub mod timers;
pub mod transport;

pub use client::{Tally, TallyBuilder};
pub use flush::{FlushOutcome, FlushReport, FlushTrigger};
pub use queue::{CancellationToken, QueueStats, TaskQueue};
pub use timers::TimeUnit;
