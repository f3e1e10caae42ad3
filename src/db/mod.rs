pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, SyncError};
use crate::favorites::FavoritesList;

/// A stored cloud value together with the revision that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEntry {
    pub key: String,
    pub value: FavoritesList,
    pub revision: i64,
    pub updated_by: String,
}

/// Thread-safe database wrapper for the cloud key-value table.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the cloud database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        schema::initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Execute a closure with access to the database connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| {
            SyncError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(format!("Lock poisoned: {}", e)),
            ))
        })?;
        f(&mut conn)
    }

    /// Write a value, last writer wins. Returns the new revision.
    pub fn put_value(&self, key: &str, value: &FavoritesList, writer: &str) -> Result<i64> {
        let json = serde_json::to_string(value)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let revision = next_revision(&tx)?;
            tx.execute(
                "INSERT INTO kv_entries (key, value, revision, updated_by, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    revision = excluded.revision,
                    updated_by = excluded.updated_by,
                    updated_at = excluded.updated_at",
                rusqlite::params![key, json, revision, writer, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            Ok(revision)
        })
    }

    /// Delete a key. Returns whether a row existed.
    pub fn delete_value(&self, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let deleted = tx.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
            if deleted > 0 {
                next_revision(&tx)?;
            }
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    pub fn get_value(&self, key: &str) -> Result<Option<CloudEntry>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT key, value, revision, updated_by FROM kv_entries WHERE key = ?1",
                    [key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?)
        })?;
        row.map(decode_entry).transpose()
    }

    /// Every stored entry, ordered by key.
    pub fn all_entries(&self) -> Result<Vec<CloudEntry>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, revision, updated_by FROM kv_entries ORDER BY key",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(decode_entry).collect()
    }
}

fn next_revision(conn: &Connection) -> Result<i64> {
    conn.execute("UPDATE kv_revision SET current = current + 1 WHERE id = 1", [])?;
    Ok(conn.query_row("SELECT current FROM kv_revision WHERE id = 1", [], |row| {
        row.get(0)
    })?)
}

fn decode_entry((key, json, revision, updated_by): (String, String, i64, String)) -> Result<CloudEntry> {
    let value: FavoritesList = serde_json::from_str(&json)?;
    Ok(CloudEntry {
        key,
        value,
        revision,
        updated_by,
    })
}
