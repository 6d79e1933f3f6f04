//! Key/value cache with per-entry TTL
//!
//! The crawler only needs `get`, `set` and `close`. Two backends exist:
//! - [`MemoryCache`]: in-process, lost on restart
//! - [`SqliteCache`]: a `cache` table in a SQLite file, shared by every
//!   worker process on one machine
//!
//! [`open_cache`] picks the backend from configuration; nothing else in the
//! crate looks at which one is in use.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::config::{CacheBackend, Config};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache is closed")]
    Closed,
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A string cache with expiring entries
pub trait Cache: Send + Sync {
    /// Returns the value for `key` unless it is missing or expired
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key` for `ttl`
    fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Releases the backend; later calls fail with [`CacheError::Closed`]
    fn close(&self) -> CacheResult<()>;
}

/// Opens the cache backend selected by `config.cache`
///
/// The SQLite backend uses `cache.path`, or the main database file when no
/// separate path is configured.
pub fn open_cache(config: &Config) -> CacheResult<Arc<dyn Cache>> {
    match config.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Sqlite => {
            let path = config
                .cache
                .path
                .as_deref()
                .unwrap_or(&config.storage.database_path);
            Ok(Arc::new(SqliteCache::new(path)?))
        }
    }
}
