use rusqlite::Connection;

use crate::error::Result;

/// Initialize the cloud key-value schema.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per key; value is a JSON array of strings
        CREATE TABLE IF NOT EXISTS kv_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            revision INTEGER NOT NULL,
            updated_by TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Single-row counter handing out monotonically increasing revisions
        CREATE TABLE IF NOT EXISTS kv_revision (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            current INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO kv_revision (id, current) VALUES (1, 0);

        PRAGMA journal_mode=WAL;
        ",
    )?;

    Ok(())
}
