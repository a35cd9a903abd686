//! Key-value persistence for cached artifacts.
//!
//! RULE: Only store.rs talks to the database.
//! The cache layer calls `KeyValueStore` methods and never executes SQL.

use crate::error::AnalyticsResult;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AnalyticsResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> AnalyticsResult<()>;

    /// Write several keys at once. Readers observe all of them or none.
    fn set_many(&self, entries: &[(&str, &str)]) -> AnalyticsResult<()>;
}

// ── SQLite ─────────────────────────────────────────────────────────

pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &str) -> AnalyticsResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode: readers never block the single writer.
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL;", [], |row| row.get(0))?;
        log::debug!("store: opened {path} (journal_mode={mode})");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AnalyticsResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalyticsResult<()> {
        self.conn
            .lock()
            .execute_batch(include_str!("../../migrations/001_artifact_cache.sql"))?;
        Ok(())
    }
}

impl KeyValueStore for SqliteKv {
    fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> AnalyticsResult<()> {
        self.set_many(&[(key, value)])
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> AnalyticsResult<()> {
        let written_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv (key, value, written_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    written_at = excluded.written_at",
                params![key, value, written_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ── In-memory ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AnalyticsResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> AnalyticsResult<()> {
        let mut map = self.entries.write();
        for (key, value) in entries {
            map.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}
