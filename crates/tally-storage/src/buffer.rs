//! SQLite-backed durable event buffer.

use std::sync::Arc;

use chrono::Utc;
use tally_core::errors::StorageError;
use tally_core::traits::EventStore;
use tally_core::{BufferedRecord, Event, SequenceId};

use crate::connection::writer::with_immediate_transaction;
use crate::connection::StorageManager;
use crate::queries::events as q;

/// Append-only, capacity-bounded event log.
///
/// Sequence ids continue from the table's AUTOINCREMENT high-water mark, so
/// they stay strictly increasing across restarts and are never reused after
/// deletion. When an append pushes the row count over capacity, the oldest
/// rows are evicted in the same transaction.
pub struct SqliteEventBuffer {
    db: Arc<StorageManager>,
    capacity: usize,
    next_seq: SequenceId,
}

impl SqliteEventBuffer {
    /// Open the buffer over `db` with room for `capacity` rows.
    /// A store already holding more rows than `capacity` is trimmed.
    pub fn new(db: Arc<StorageManager>, capacity: usize) -> Result<Self, StorageError> {
        let high_water = db.with_conn(q::high_water_mark)?;
        let mut buffer = Self {
            db,
            capacity: capacity.max(1),
            next_seq: high_water + 1,
        };
        buffer.trim_to_capacity()?;
        tracing::debug!(
            next_seq = buffer.next_seq,
            capacity = buffer.capacity,
            "buffer: opened"
        );
        Ok(buffer)
    }

    fn trim_to_capacity(&mut self) -> Result<usize, StorageError> {
        let capacity = self.capacity;
        let evicted = self.db.with_conn(|conn| {
            with_immediate_transaction(conn, |tx| {
                let count = q::count_events(tx)?;
                q::evict_oldest(tx, count.saturating_sub(capacity))
            })
        })?;
        if evicted > 0 {
            tracing::warn!(evicted, capacity, "buffer: over capacity, dropped oldest events");
        }
        Ok(evicted)
    }
}

impl EventStore for SqliteEventBuffer {
    fn append(&mut self, event: &mut Event) -> Result<SequenceId, StorageError> {
        let seq = self.next_seq;
        event.sequence_id = seq;
        let payload = serde_json::to_string(&*event).map_err(|e| StorageError::Serialization {
            what: "event",
            message: e.to_string(),
        })?;
        let capacity = self.capacity;
        let created_at = Utc::now().timestamp_millis();

        let evicted = self.db.with_conn(|conn| {
            with_immediate_transaction(conn, |tx| {
                q::insert_event(tx, seq, &payload, created_at)?;
                let count = q::count_events(tx)?;
                q::evict_oldest(tx, count.saturating_sub(capacity))
            })
        })?;

        self.next_seq = seq + 1;
        if evicted > 0 {
            tracing::warn!(evicted, capacity, "buffer: full, dropped oldest events");
        }
        Ok(seq)
    }

    fn peek_batch(&self, limit: usize) -> Result<Vec<BufferedRecord>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.db.with_conn(|conn| q::peek_events(conn, limit))
    }

    fn delete_up_to(&mut self, sequence_id: SequenceId) -> Result<usize, StorageError> {
        self.db.with_conn(|conn| {
            with_immediate_transaction(conn, |tx| q::delete_up_to(tx, sequence_id))
        })
    }

    fn count(&self) -> Result<usize, StorageError> {
        self.db.with_conn(q::count_events)
    }

    fn clear(&mut self) -> Result<usize, StorageError> {
        self.db
            .with_conn(|conn| with_immediate_transaction(conn, |tx| q::clear_events(tx)))
    }

    fn set_capacity(&mut self, max_rows: usize) -> Result<usize, StorageError> {
        self.capacity = max_rows.max(1);
        self.trim_to_capacity()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
