//! Queries for the events table.

use rusqlite::{params, Connection, OptionalExtension};
use tally_core::errors::StorageError;
use tally_core::{BufferedRecord, SequenceId};

use crate::to_storage_err;

pub fn insert_event(
    conn: &Connection,
    seq: SequenceId,
    payload: &str,
    created_at: i64,
) -> Result<(), StorageError> {
    conn.prepare_cached("INSERT INTO events (seq, payload, created_at) VALUES (?1, ?2, ?3)")
        .and_then(|mut stmt| stmt.execute(params![seq as i64, payload, created_at]))
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(())
}

pub fn count_events(conn: &Connection) -> Result<usize, StorageError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(count as usize)
}

/// Oldest `limit` records in sequence order.
pub fn peek_events(conn: &Connection, limit: usize) -> Result<Vec<BufferedRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached("SELECT seq, payload FROM events ORDER BY seq ASC LIMIT ?1")
        .map_err(|e| to_storage_err(e.to_string()))?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(BufferedRecord {
                sequence_id: row.get::<_, i64>(0)? as SequenceId,
                payload: row.get(1)?,
            })
        })
        .map_err(|e| to_storage_err(e.to_string()))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| to_storage_err(e.to_string()))
}

pub fn delete_up_to(conn: &Connection, seq: SequenceId) -> Result<usize, StorageError> {
    conn.execute("DELETE FROM events WHERE seq <= ?1", params![seq as i64])
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Drop the `n` oldest rows.
pub fn evict_oldest(conn: &Connection, n: usize) -> Result<usize, StorageError> {
    if n == 0 {
        return Ok(0);
    }
    conn.execute(
        "DELETE FROM events WHERE seq IN (SELECT seq FROM events ORDER BY seq ASC LIMIT ?1)",
        params![n as i64],
    )
    .map_err(|e| to_storage_err(e.to_string()))
}

pub fn clear_events(conn: &Connection) -> Result<usize, StorageError> {
    conn.execute("DELETE FROM events", [])
        .map_err(|e| to_storage_err(e.to_string()))
}

/// Highest sequence id ever handed out, surviving deletes.
pub fn high_water_mark(conn: &Connection) -> Result<SequenceId, StorageError> {
    let from_sequence: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'events'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| to_storage_err(e.to_string()))?;
    let from_table: Option<i64> = conn
        .query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))
        .map_err(|e| to_storage_err(e.to_string()))?;
    Ok(from_sequence.unwrap_or(0).max(from_table.unwrap_or(0)).max(0) as SequenceId)
}
