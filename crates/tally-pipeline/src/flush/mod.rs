//! Flush engine: move buffered events to the collector, oldest first.
//!
//! At most one batch is in flight at a time. A batch is deleted from the
//! buffer only after the transport confirms it, and only if the worker
//! generation that sent it was not cancelled meanwhile. Failed batches stay
//! put and are retried, unchanged, on the next trigger.

pub mod scheduler;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tally_core::errors::{TallyResult, TransportError};
use tally_core::flush_span;
use tally_core::traits::{DeviceInfo, Transport};

use crate::engine::Engine;
use crate::policy::FlushPolicy;
use crate::queue::CancellationToken;

pub use scheduler::FlushScheduler;

/// What asked for a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Manual,
    BulkSize,
    Timer,
    Background,
    Enable,
    /// Continuation of a drain that ran out of budget.
    Continue,
}

/// Why a flush did not attempt delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NetworkDisallowed,
    NoServer,
    InFlight,
}

/// How a flush round ended.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Buffer empty (possibly after sending).
    Drained,
    /// Budget exhausted with events left; another round should be queued.
    MorePending,
    /// Upload failed; the batch is still buffered.
    Failed(TransportError),
    /// The sending generation was cancelled; the response was ignored.
    Cancelled,
    Skipped(SkipReason),
}

impl FlushOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of one flush round.
#[derive(Debug)]
pub struct FlushReport {
    /// Batches confirmed and deleted.
    pub batches: usize,
    /// Events confirmed and deleted.
    pub sent: usize,
    pub outcome: FlushOutcome,
}

impl FlushReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            batches: 0,
            sent: 0,
            outcome: FlushOutcome::Skipped(reason),
        }
    }
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches, {} events, {:?}",
            self.batches, self.sent, self.outcome
        )
    }
}

/// Clears the in-flight flag however the round ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stateless apart from the in-flight flag; collaborators are passed per round.
#[derive(Debug, Default)]
pub struct FlushEngine {
    in_flight: AtomicBool,
}

impl FlushEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one flush round. The engine lock is released while uploading.
    pub fn run(
        &self,
        trigger: FlushTrigger,
        engine: &Mutex<Engine>,
        policy: &FlushPolicy,
        device: &dyn DeviceInfo,
        transport: Option<&Arc<dyn Transport>>,
        token: &CancellationToken,
    ) -> TallyResult<FlushReport> {
        if !policy.is_enabled() {
            return Ok(FlushReport::skipped(SkipReason::Disabled));
        }
        let network = device.network_type();
        if !policy.allows(network) {
            tracing::debug!(network = network.label(), "flush: network not allowed by policy");
            return Ok(FlushReport::skipped(SkipReason::NetworkDisallowed));
        }
        let Some(transport) = transport else {
            return Ok(FlushReport::skipped(SkipReason::NoServer));
        };
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(FlushReport::skipped(SkipReason::InFlight));
        }
        let _guard = InFlightGuard(&self.in_flight);

        let bulk_size = policy.bulk_size();
        let budget = policy.drain_budget();
        let started = Instant::now();
        let pending = lock(engine).store().count()?;
        let span = flush_span!(trigger, pending);
        let _entered = span.enter();

        let mut report = FlushReport {
            batches: 0,
            sent: 0,
            outcome: FlushOutcome::Drained,
        };

        loop {
            let batch = lock(engine).store().peek_batch(bulk_size)?;
            let Some(last) = batch.last().map(|r| r.sequence_id) else {
                report.outcome = FlushOutcome::Drained;
                break;
            };
            let body = format!(
                "[{}]",
                batch
                    .iter()
                    .map(|r| r.payload.as_str())
                    .collect::<Vec<_>>()
                    .join(",")
            );

            let result = transport.upload(&body);

            if token.is_cancelled() {
                tracing::info!("flush: worker stopped during upload, ignoring response");
                report.outcome = FlushOutcome::Cancelled;
                break;
            }
            if let Err(e) = result {
                tracing::warn!(batch = batch.len(), "flush: upload failed, keeping batch: {e}");
                report.outcome = FlushOutcome::Failed(e);
                break;
            }

            let removed = lock(engine).store_mut().delete_up_to(last)?;
            report.batches += 1;
            report.sent += removed;
            tracing::debug!(removed, up_to = last, "flush: batch confirmed");

            if batch.len() < bulk_size {
                report.outcome = FlushOutcome::Drained;
                break;
            }
            if started.elapsed() >= budget {
                let remaining = lock(engine).store().count()?;
                report.outcome = if remaining > 0 {
                    FlushOutcome::MorePending
                } else {
                    FlushOutcome::Drained
                };
                break;
            }
        }

        tracing::info!("flush: {report}");
        Ok(report)
    }
}

fn lock(engine: &Mutex<Engine>) -> MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(|e| e.into_inner())
}
