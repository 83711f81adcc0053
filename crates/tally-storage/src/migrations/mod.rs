//! Schema migrations tracked with `PRAGMA user_version`.

pub mod v001_initial;

use rusqlite::Connection;
use tally_core::errors::StorageError;

use crate::connection::writer::with_immediate_transaction;

/// Ordered list of (version, sql). Append only.
const MIGRATIONS: &[(u32, &str)] = &[(1, v001_initial::MIGRATION_SQL)];

/// Latest schema version this build knows about.
pub const LATEST_VERSION: u32 = 1;

/// Current schema version of the database.
pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StorageError::SqliteError {
            message: e.to_string(),
        })
}

/// Apply every migration newer than the database's `user_version`.
/// Each migration runs in its own transaction together with the version bump.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let current = current_version(conn)?;
    if current > LATEST_VERSION {
        return Err(StorageError::MigrationFailed {
            version: current,
            message: format!("database is newer than this build (latest {LATEST_VERSION})"),
        });
    }

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        tracing::info!("migrations: applying v{version:03}");
        with_immediate_transaction(conn, |tx| {
            tx.execute_batch(sql)
                .and_then(|()| tx.pragma_update(None, "user_version", version))
                .map_err(|e| StorageError::MigrationFailed {
                    version,
                    message: e.to_string(),
                })
        })?;
    }
    Ok(())
}
