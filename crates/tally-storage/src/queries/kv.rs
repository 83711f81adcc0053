//! Queries for the kv table.

use rusqlite::{params, Connection, OptionalExtension};
use tally_core::errors::StorageError;

use crate::to_storage_err;

pub fn get_value(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")
        .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn set_value(
    conn: &Connection,
    key: &str,
    value: &str,
    updated_at: i64,
) -> Result<(), StorageError> {
    conn.prepare_cached(
        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .and_then(|mut stmt| stmt.execute(params![key, value, updated_at]))
    .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn remove_value(conn: &Connection, key: &str) -> Result<(), StorageError> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}
