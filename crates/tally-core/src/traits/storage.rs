use crate::errors::StorageError;
use crate::event::{BufferedRecord, Event, SequenceId};

/// Append-only, capacity-bounded, ordered log of serialized events.
///
/// Only the task-queue worker touches the store, so methods take `&mut self`.
/// Implementations must make `append` and `delete_up_to` atomic at the
/// storage layer.
pub trait EventStore: Send {
    /// Assign the next sequence id to `event`, persist it, and evict the
    /// oldest rows if the store is over capacity. Returns the assigned id.
    fn append(&mut self, event: &mut Event) -> Result<SequenceId, StorageError>;

    /// Up to `limit` oldest records, not removed.
    fn peek_batch(&self, limit: usize) -> Result<Vec<BufferedRecord>, StorageError>;

    /// Remove every record with sequence id <= `sequence_id`.
    /// Returns how many rows were removed.
    fn delete_up_to(&mut self, sequence_id: SequenceId) -> Result<usize, StorageError>;

    fn count(&self) -> Result<usize, StorageError>;

    /// Remove everything. Returns how many rows were removed.
    fn clear(&mut self) -> Result<usize, StorageError>;

    /// Change the row capacity; shrinking evicts the oldest rows immediately.
    fn set_capacity(&mut self, max_rows: usize) -> Result<usize, StorageError>;

    fn capacity(&self) -> usize;
}

/// Small persisted key/value surface for identity, super properties, and
/// runtime policy values.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}
