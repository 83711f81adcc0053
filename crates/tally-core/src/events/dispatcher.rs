//! ListenerDispatcher: synchronous fan-out to registered listeners.

use std::sync::{Arc, RwLock};

use crate::errors::TallyError;
use crate::traits::TallyListener;

/// Ordered set of listener handles, notified synchronously in
/// registration order.
///
/// Listeners that panic are caught and do not prevent subsequent listeners
/// from receiving the notification.
#[derive(Default)]
pub struct ListenerDispatcher {
    listeners: RwLock<Vec<Arc<dyn TallyListener>>>,
}

impl ListenerDispatcher {
    /// Create a new empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same handle twice is a no-op.
    pub fn register(&self, listener: Arc<dyn TallyListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                listeners.push(listener);
            }
        }
    }

    /// Remove a previously registered listener handle.
    pub fn unregister(&self, listener: &Arc<dyn TallyListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }

    fn emit<F: Fn(&dyn TallyListener)>(&self, f: F) {
        // Snapshot so listeners may register others without deadlocking.
        let listeners: Vec<Arc<dyn TallyListener>> = match self.listeners.read() {
            Ok(l) => l.clone(),
            Err(_) => return,
        };
        for listener in &listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                f(listener.as_ref());
            }));
            if result.is_err() {
                tracing::warn!("listener: callback panicked, continuing");
            }
        }
    }

    // ---- Identity ----
    pub fn emit_identify(&self, anonymous_id: &str) {
        self.emit(|l| l.on_identify(anonymous_id));
    }

    pub fn emit_login(&self, login_id: &str) {
        self.emit(|l| l.on_login(login_id));
    }

    pub fn emit_logout(&self) {
        self.emit(|l| l.on_logout());
    }

    pub fn emit_reset_anonymous_id(&self, anonymous_id: &str) {
        self.emit(|l| l.on_reset_anonymous_id(anonymous_id));
    }

    // ---- Lifecycle ----
    pub fn emit_collection_disabled(&self) {
        self.emit(|l| l.on_collection_disabled());
    }

    pub fn emit_collection_enabled(&self) {
        self.emit(|l| l.on_collection_enabled());
    }

    pub fn emit_data_collect_enabled(&self) {
        self.emit(|l| l.on_data_collect_enabled());
    }

    // ---- Errors ----
    pub fn emit_error(&self, error: &TallyError) {
        self.emit(|l| l.on_error(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        logins: AtomicUsize,
    }

    impl TallyListener for Counting {
        fn on_login(&self, _login_id: &str) {
            self.logins.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl TallyListener for Panicking {
        fn on_login(&self, _login_id: &str) {
            panic!("listener failure");
        }
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let dispatcher = ListenerDispatcher::new();
        let counting = Arc::new(Counting::default());
        dispatcher.register(Arc::new(Panicking));
        dispatcher.register(counting.clone());

        dispatcher.emit_login("u1");
        assert_eq!(counting.logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_registration_notifies_once() {
        let dispatcher = ListenerDispatcher::new();
        let counting = Arc::new(Counting::default());
        let handle: Arc<dyn TallyListener> = counting.clone();
        dispatcher.register(handle.clone());
        dispatcher.register(handle.clone());
        assert_eq!(dispatcher.listener_count(), 1);

        dispatcher.emit_login("u1");
        assert_eq!(counting.logins.load(Ordering::SeqCst), 1);

        dispatcher.unregister(&handle);
        assert_eq!(dispatcher.listener_count(), 0);
    }
}
