use crate::value::Properties;

/// Per-call properties computed on the caller thread for every `track`.
pub trait DynamicProperties: Send + Sync {
    fn properties(&self) -> Properties;
}

/// Last look at a Track event on the worker before it is buffered.
/// Returning `false` drops the event.
pub trait EventInterceptor: Send + Sync {
    fn on_track_event(&self, event_name: &str, properties: &mut Properties) -> bool;
}
