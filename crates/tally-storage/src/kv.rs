//! SQLite-backed persisted key/value store.

use std::sync::Arc;

use chrono::Utc;
use tally_core::errors::StorageError;
use tally_core::traits::KeyValueStore;

use crate::connection::StorageManager;
use crate::queries::kv as q;

/// Persisted identity, super properties, and policy values.
pub struct SqliteKeyValueStore {
    db: Arc<StorageManager>,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<StorageManager>) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.db.with_conn(|conn| q::get_value(conn, key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = Utc::now().timestamp_millis();
        self.db.with_conn(|conn| q::set_value(conn, key, value, now))
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.db.with_conn(|conn| q::remove_value(conn, key))
    }
}
