//! Worker loop for one queue generation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tally_core::errors::{TallyError, TallyErrorCode};
use tally_core::task_span;

use super::{CancellationToken, Counters, ErrorHook, Message};

pub(super) struct Worker {
    pub(super) receiver: Receiver<Message>,
    pub(super) token: CancellationToken,
    pub(super) counters: Arc<Counters>,
    pub(super) on_error: Option<ErrorHook>,
}

impl Worker {
    pub(super) fn run(self) {
        while let Ok(message) = self.receiver.recv() {
            if self.token.is_cancelled() {
                self.discard_rest(message);
                return;
            }
            match message {
                Message::Run { label, task } => self.execute(label, task),
                Message::Barrier(ack) => {
                    let _ = ack.send(());
                }
                Message::Shutdown => {
                    tracing::debug!("queue: shutdown marker reached");
                    return;
                }
            }
        }
    }

    fn execute(&self, label: &'static str, task: super::Task) {
        let span = task_span!(label);
        let _entered = span.enter();

        let token = &self.token;
        let error = match catch_unwind(AssertUnwindSafe(|| task(token))) {
            Ok(Ok(())) => {
                self.counters.executed.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Ok(Err(e)) => e,
            Err(panic) => TallyError::TaskPanicked {
                message: panic_message(panic.as_ref()),
            },
        };

        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(task = label, "queue: {}", error.diagnostic_string());
        if let Some(hook) = &self.on_error {
            if catch_unwind(AssertUnwindSafe(|| hook(&error))).is_err() {
                tracing::warn!("queue: error hook panicked");
            }
        }
    }

    fn discard_rest(&self, first: Message) {
        let mut discarded = u64::from(matches!(first, Message::Run { .. }));
        // Dropping barrier senders wakes their waiters with a disconnect.
        drop(first);
        for message in self.receiver.try_iter() {
            if matches!(message, Message::Run { .. }) {
                discarded += 1;
            }
        }
        if discarded > 0 {
            tracing::debug!(discarded, "queue: generation cancelled, discarding pending units");
        }
        self.counters.discard(discarded);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
