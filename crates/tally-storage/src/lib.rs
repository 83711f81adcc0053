//! # tally-storage
//!
//! SQLite persistence for the Tally pipeline: the durable event buffer
//! (`EventStore`) and the persisted key/value surface (`KeyValueStore`).
//! One connection per database, WAL mode, `PRAGMA user_version` migrations,
//! `BEGIN IMMEDIATE` write transactions.

pub mod buffer;
pub mod connection;
pub mod kv;
pub mod migrations;
pub mod queries;

pub use buffer::SqliteEventBuffer;
pub use connection::StorageManager;
pub use kv::SqliteKeyValueStore;

use tally_core::errors::StorageError;

/// Convert any SQLite-ish failure into a `StorageError`.
pub(crate) fn to_storage_err(message: impl Into<String>) -> StorageError {
    StorageError::SqliteError {
        message: message.into(),
    }
}
