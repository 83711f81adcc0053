//! Task queue: strict FIFO of units of work on one dedicated thread.
//!
//! Every stateful mutation in the pipeline runs here. Enqueueing never
//! blocks (unbounded channel). Each worker generation carries its own
//! [`CancellationToken`]; `stop` cancels it and discards whatever is still
//! pending, `start` spawns a fresh generation with an empty queue.

mod token;
mod worker;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use tally_core::errors::{TallyError, TallyResult};

pub use token::CancellationToken;

/// One unit of work. Receives the token of the generation running it.
pub type Task = Box<dyn FnOnce(&CancellationToken) -> TallyResult<()> + Send + 'static>;

/// Called on the worker for every unit that fails.
pub type ErrorHook = Arc<dyn Fn(&TallyError) + Send + Sync>;

pub(crate) enum Message {
    Run { label: &'static str, task: Task },
    Barrier(Sender<()>),
    Shutdown,
}

/// Counters across all worker generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Units that returned `Ok`.
    pub executed: u64,
    /// Units that returned `Err` or panicked.
    pub failed: u64,
    /// Units dropped by `stop`, or enqueued while stopped.
    pub discarded: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    executed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn discard(&self, n: u64) {
        self.discarded.fetch_add(n, Ordering::Relaxed);
    }
}

struct Generation {
    sender: Sender<Message>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

#[derive(Default)]
struct State {
    generation: Option<Generation>,
    started: u64,
    gated: bool,
    held: VecDeque<Message>,
}

impl State {
    /// A unit pushed now would be sent or held rather than dropped. A
    /// stopped queue refuses units even while gated.
    fn accepting(&self) -> bool {
        self.generation.is_some()
    }
}

/// Single-worker FIFO executor.
pub struct TaskQueue {
    name: String,
    state: Mutex<State>,
    counters: Arc<Counters>,
    on_error: Option<ErrorHook>,
}

impl TaskQueue {
    /// Create a stopped queue. Call [`TaskQueue::start`] to spawn the worker.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
            counters: Arc::new(Counters::default()),
            on_error: None,
        }
    }

    /// Install a hook that observes every failed unit.
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding this lock leaves the state consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn a fresh worker with an empty queue. No-op if already running.
    pub fn start(&self) -> TallyResult<()> {
        let mut state = self.lock();
        if state.generation.is_some() {
            return Ok(());
        }
        let (sender, receiver) = unbounded();
        state.started += 1;
        let token = CancellationToken::for_generation(state.started);
        let worker = worker::Worker {
            receiver,
            token: token.clone(),
            counters: Arc::clone(&self.counters),
            on_error: self.on_error.clone(),
        };
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                tracing::error!("queue: failed to spawn worker: {e}");
                TallyError::QueueStopped
            })?;
        let thread_id = handle.thread().id();
        state.generation = Some(Generation {
            sender,
            token,
            handle: Some(handle),
            thread_id,
        });
        tracing::debug!(queue = %self.name, generation = state.started, "queue: worker started");
        Ok(())
    }

    /// Cancel the current generation. Pending units are discarded and the
    /// worker exits after the unit it is running. Does not wait for it.
    pub fn stop(&self) {
        let mut state = self.lock();
        let held = state.held.len() as u64;
        state.held.clear();
        self.counters.discard(held);
        if let Some(generation) = state.generation.take() {
            generation.token.cancel();
            // Dropping the sender and handle detaches the worker.
            tracing::debug!(queue = %self.name, "queue: worker stopped");
        }
    }

    /// Run everything enqueued so far, then stop the worker and join it.
    pub fn shutdown(&self) -> QueueStats {
        let generation = {
            let mut state = self.lock();
            let held = state.held.len() as u64;
            state.held.clear();
            self.counters.discard(held);
            state.generation.take()
        };
        if let Some(mut generation) = generation {
            let _ = generation.sender.send(Message::Shutdown);
            drop(generation.sender);
            if let Some(handle) = generation.handle.take() {
                if thread::current().id() != generation.thread_id && handle.join().is_err() {
                    tracing::warn!(queue = %self.name, "queue: worker panicked during shutdown");
                }
            }
        }
        self.stats()
    }

    /// Append a unit. Order of execution is order of enqueue.
    ///
    /// Returns `Err(QueueStopped)` when no worker is running; the unit is
    /// dropped. While gated, a running queue holds units and returns `Ok`.
    pub fn enqueue<F>(&self, label: &'static str, task: F) -> TallyResult<()>
    where
        F: FnOnce(&CancellationToken) -> TallyResult<()> + Send + 'static,
    {
        self.push(Message::Run {
            label,
            task: Box::new(task),
        })
    }

    /// Enqueue a unit whose caller-side half must land in the same order.
    ///
    /// `commit` runs under the queue lock, and only once the unit is known
    /// to be accepted; its value is handed to `task` on the worker. When
    /// `commit` returns `None` nothing is enqueued and `Ok(false)` comes
    /// back. When the queue is stopped `commit` never runs.
    pub fn enqueue_with<T, C, F>(&self, label: &'static str, commit: C, task: F) -> TallyResult<bool>
    where
        T: Send + 'static,
        C: FnOnce() -> Option<T>,
        F: FnOnce(T, &CancellationToken) -> TallyResult<()> + Send + 'static,
    {
        let mut state = self.lock();
        if !state.accepting() {
            return self.refuse().map(|()| false);
        }
        let Some(value) = commit() else {
            return Ok(false);
        };
        let message = Message::Run {
            label,
            task: Box::new(move |token: &CancellationToken| task(value, token)),
        };
        self.push_locked(&mut state, message).map(|()| true)
    }

    fn push(&self, message: Message) -> TallyResult<()> {
        let mut state = self.lock();
        self.push_locked(&mut state, message)
    }

    fn push_locked(&self, state: &mut State, message: Message) -> TallyResult<()> {
        if !state.accepting() {
            return self.refuse();
        }
        if state.gated {
            state.held.push_back(message);
            return Ok(());
        }
        let sent = state
            .generation
            .as_ref()
            .is_some_and(|generation| generation.sender.send(message).is_ok());
        if sent {
            Ok(())
        } else {
            self.refuse()
        }
    }

    fn refuse(&self) -> TallyResult<()> {
        self.counters.discard(1);
        tracing::debug!(queue = %self.name, "queue: stopped, dropping unit");
        Err(TallyError::QueueStopped)
    }

    /// Wait until every unit enqueued before this call has run.
    ///
    /// Returns false on timeout, when the barrier is discarded by `stop`,
    /// or when called from the worker thread itself.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if self.is_worker_thread() {
            return false;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        match self.push(Message::Barrier(ack_tx)) {
            Ok(()) => ack_rx.recv_timeout(timeout).is_ok(),
            // Nothing can be pending without a worker.
            Err(_) => true,
        }
    }

    /// Hold new units instead of running them.
    pub fn close_gate(&self) {
        self.lock().gated = true;
    }

    /// Release held units, in order, and stop holding.
    pub fn open_gate(&self) {
        let mut state = self.lock();
        state.gated = false;
        let held: Vec<Message> = state.held.drain(..).collect();
        if held.is_empty() {
            return;
        }
        tracing::debug!(queue = %self.name, released = held.len(), "queue: gate opened");
        match state.generation.as_ref() {
            Some(generation) => {
                for message in held {
                    if generation.sender.send(message).is_err() {
                        self.counters.discard(1);
                    }
                }
            }
            None => self.counters.discard(held.len() as u64),
        }
    }

    pub fn is_gated(&self) -> bool {
        self.lock().gated
    }

    pub fn is_running(&self) -> bool {
        self.lock().generation.is_some()
    }

    /// Units waiting to run, including held ones.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        state.held.len() + state.generation.as_ref().map_or(0, |g| g.sender.len())
    }

    /// Token of the running generation, if any.
    pub fn current_token(&self) -> Option<CancellationToken> {
        self.lock().generation.as_ref().map(|g| g.token.clone())
    }

    /// Whether the calling thread is the current worker.
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.lock()
            .generation
            .as_ref()
            .is_some_and(|g| g.thread_id == current)
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if let Some(generation) = self.lock().generation.as_ref() {
            generation.token.cancel();
        }
    }
}
