//! Per-generation stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handed to every unit a worker generation runs.
///
/// `stop` flips it for the whole generation, so a unit still running
/// afterwards (a blocked upload) can tell its result no longer counts.
/// A restarted queue hands out a fresh token with the next generation
/// number; old tokens stay cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    generation: u64,
    stopped: Arc<AtomicBool>,
}

impl CancellationToken {
    pub(crate) fn for_generation(generation: u64) -> Self {
        Self {
            generation,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Which worker generation this token belongs to, counting from 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}
