// src/state.rs
// Durable last-seen marker per source: read once at startup to seed the
// in-memory cursor, overwritten after each successful dispatch. Only the
// owning source loop ever touches its row, so a plain mutex around the
// connection is all the serialization the backend needs.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StateError;

pub trait LastSeenStore: Send + Sync {
    fn get_last_id(&self, source: &str) -> Result<Option<String>, StateError>;
    fn set_last_id(&self, source: &str, id: &str) -> Result<(), StateError>;
}

pub struct SqliteMarkerStore {
    conn: Mutex<Connection>,
}

impl SqliteMarkerStore {
    pub fn open(path: &Path) -> Result<Self, StateError> {
        if let Some(dir) = path.parent() {
            // Ignore create errors here; the open below reports the real problem.
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Safe to call on every startup (idempotent).
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS last_seen (
            source_id    TEXT PRIMARY KEY,
            last_item_id TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );",
    )
}

impl LastSeenStore for SqliteMarkerStore {
    fn get_last_id(&self, source: &str) -> Result<Option<String>, StateError> {
        let conn = self.conn.lock().expect("marker store mutex poisoned");
        let id = conn
            .query_row(
                "SELECT last_item_id FROM last_seen WHERE source_id = ?1",
                [source],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(id)
    }

    fn set_last_id(&self, source: &str, id: &str) -> Result<(), StateError> {
        let conn = self.conn.lock().expect("marker store mutex poisoned");
        conn.execute(
            "INSERT INTO last_seen (source_id, last_item_id, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(source_id) DO UPDATE SET
               last_item_id = excluded.last_item_id,
               updated_at   = excluded.updated_at",
            (source, id, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }
}

/// In-memory store for tests and for running without a data directory.
#[derive(Default)]
pub struct MemoryMarkerStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LastSeenStore for MemoryMarkerStore {
    fn get_last_id(&self, source: &str) -> Result<Option<String>, StateError> {
        Ok(self
            .inner
            .lock()
            .expect("marker map mutex poisoned")
            .get(source)
            .cloned())
    }

    fn set_last_id(&self, source: &str, id: &str) -> Result<(), StateError> {
        self.inner
            .lock()
            .expect("marker map mutex poisoned")
            .insert(source.to_string(), id.to_string());
        Ok(())
    }
}
