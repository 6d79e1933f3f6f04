//! Persistent store for crawl state
//!
//! This module handles all relational state the crawler shares between
//! processes:
//! - `urls`: one row per profile, including its lease (`locked`)
//! - `hosts`: per-host/IP throttle records
//! - `webhooks`: pending callbacks per profile URL
//!
//! Every mutual-exclusion decision is a single conditional statement against
//! this store, so several worker processes can share one database file.

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::Path;

/// Opens (or creates) the persistent store at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A row of the `urls` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub url: String,
    pub host: String,
    pub ip: String,
    /// Graph node backing this profile, once created
    pub node: Option<i64>,
    pub added: DateTime<Utc>,
    pub requested: Option<DateTime<Utc>>,
    pub fetched: Option<DateTime<Utc>>,
    pub locked: Option<DateTime<Utc>>,
    pub refresh: bool,
    pub completed: bool,
    pub disallowed: bool,
    pub failed: u32,
}

/// Values for a profile row that does not exist yet
#[derive(Debug, Clone)]
pub struct NewProfile<'a> {
    pub url: &'a str,
    pub host: &'a str,
    pub ip: &'a str,
    pub now: DateTime<Utc>,
    pub requested: bool,
}

/// Windows used by the claim query, all relative to `now`
#[derive(Debug, Clone, Copy)]
pub struct ClaimWindows {
    pub now: DateTime<Utc>,
    /// A lease older than this has expired
    pub lock: Duration,
    /// A completed profile fetched longer ago than this is stale
    pub refresh_after: Duration,
    /// A host claimed more recently than this is throttled
    pub throttle: Duration,
}

impl ClaimWindows {
    pub fn from_timings(timings: &crate::config::Timings, now: DateTime<Utc>) -> Self {
        Self {
            now,
            lock: timings.lock(),
            refresh_after: timings.refresh_after(),
            throttle: timings.throttle(),
        }
    }
}

/// Row counts reported by `relcrawl stats`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub profiles: u64,
    pub completed: u64,
    /// Profiles excluded after too many failures
    pub failed_out: u64,
    pub disallowed: u64,
    /// Profiles currently holding an unexpired lease
    pub locked: u64,
    pub hosts: u64,
    pub pending_webhooks: u64,
}

/// Number of failures after which a profile is no longer scheduled
pub const MAX_FAILURES: u32 = 3;

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
