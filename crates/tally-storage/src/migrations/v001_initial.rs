//! V001: durable event buffer and persisted key/value state.

pub const MIGRATION_SQL: &str = r#"
-- Durable buffer: append-only, ordered by seq, which is also the event's
-- _track_id. AUTOINCREMENT keeps seq from being reused after deletes.
CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Identity, super properties, and runtime policy values.
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
) STRICT;
"#;
