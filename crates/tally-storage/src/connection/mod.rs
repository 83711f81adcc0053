//! Connection management: one serialized connection per database.

pub mod pragmas;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tally_core::errors::StorageError;

use self::pragmas::apply_pragmas;
use crate::{migrations, to_storage_err};

/// Owns the database connection shared by the event buffer and the
/// key/value store.
///
/// Both stores are driven from the task-queue worker, so a single mutexed
/// connection is enough; the mutex only guards against misuse from tests.
pub struct StorageManager {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl StorageManager {
    /// Open a database at the given path, apply pragmas, run migrations.
    pub fn open(path: &Path) -> Result<Arc<Self>, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Unavailable {
                    reason: format!("create {}: {e}", parent.display()),
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| to_storage_err(e.to_string()))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for testing, or hosts without a disk).
    pub fn open_in_memory() -> Result<Arc<Self>, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| to_storage_err(e.to_string()))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Arc<Self>, StorageError> {
        apply_pragmas(&conn)?;
        migrations::run_migrations(&conn)?;
        tracing::debug!(path = ?path, "storage: database ready");
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            path,
        }))
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| to_storage_err("connection lock poisoned"))?;
        f(&guard)
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
