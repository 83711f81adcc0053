//! Periodic flush trigger on its own thread.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Thread name of the periodic trigger.
pub const THREAD_NAME: &str = "tally-flush-timer";

/// Calls `tick` every `interval()`, re-reading the interval each round so
/// runtime changes apply from the next wait. Stops when `tick` returns
/// false or when [`FlushScheduler::stop`] is called.
pub struct FlushScheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub fn spawn<I, T>(interval: I, tick: T) -> std::io::Result<Self>
    where
        I: Fn() -> Duration + Send + 'static,
        T: Fn() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval()) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !tick() {
                            tracing::debug!("scheduler: owner gone, exiting");
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it, unless called from the thread itself.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("scheduler: timer thread panicked");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
