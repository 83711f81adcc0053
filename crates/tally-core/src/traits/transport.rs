use crate::errors::TransportError;

/// Delivers one serialized batch (a JSON array of events) to the collector.
///
/// Called synchronously from the task-queue worker. `Ok(())` confirms
/// delivery of the whole batch; any error leaves the batch buffered.
pub trait Transport: Send + Sync {
    fn upload(&self, batch: &str) -> Result<(), TransportError>;
}
