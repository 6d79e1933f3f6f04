use super::{Cache, CacheError, CacheResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache(expires);
"#;

/// Cache stored in a SQLite table
///
/// Expiry is checked on read; expired rows are purged on `close`.
pub struct SqliteCache {
    conn: Mutex<Option<Connection>>,
}

impl SqliteCache {
    pub fn new<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn new_in_memory() -> CacheResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Cache for SqliteCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let guard = self.conn();
        let conn = guard.as_ref().ok_or(CacheError::Closed)?;

        let value = conn
            .query_row(
                "SELECT value FROM cache WHERE key = ?1 AND expires > ?2",
                params![key, Utc::now().timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let guard = self.conn();
        let conn = guard.as_ref().ok_or(CacheError::Closed)?;

        let expires = Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        conn.execute(
            "INSERT INTO cache (key, value, expires) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires = excluded.expires",
            params![key, value, expires],
        )?;

        Ok(())
    }

    fn close(&self) -> CacheResult<()> {
        let mut guard = self.conn();
        if let Some(conn) = guard.take() {
            conn.execute(
                "DELETE FROM cache WHERE expires <= ?1",
                params![Utc::now().timestamp_millis()],
            )?;
        }
        Ok(())
    }
}
