//! SQLite schema for the per-user document store
//!
//! One row per record, keyed by `(user_id, doc_id)`. The body is the JSON
//! record exactly as committed, owner tag included.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- users/{user_id}/sections/{doc_id}
        CREATE TABLE IF NOT EXISTS documents (
            user_id TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, doc_id)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
