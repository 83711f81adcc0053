//! Listener dispatch for identity and lifecycle notifications.

pub mod dispatcher;

pub use dispatcher::ListenerDispatcher;
