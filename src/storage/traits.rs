//! Storage traits and error types
//!
//! This module defines the trait interface for the persistent store and
//! its error type.

use crate::storage::{ClaimWindows, NewProfile, ProfileRecord, StorageStats};
use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique or primary-key constraint rejected the write
    #[error("Constraint conflict: {0}")]
    Conflict(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                StorageError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for persistent store implementations
///
/// Write operations take `&mut self`; callers share one instance behind a
/// mutex and never hold the lock across an await point.
pub trait Storage {
    // ===== Profiles =====

    /// Inserts a new profile row
    ///
    /// Fails with [`StorageError::Conflict`] when the URL already exists.
    fn insert_profile(&mut self, profile: &NewProfile<'_>) -> StorageResult<ProfileRecord>;

    /// Gets a profile by URL
    fn get_profile(&self, url: &str) -> StorageResult<Option<ProfileRecord>>;

    /// Gets the profile backed by a graph node
    fn get_profile_by_node(&self, node: i64) -> StorageResult<Option<ProfileRecord>>;

    /// Links a profile to its graph node
    fn set_profile_node(&mut self, url: &str, node: i64) -> StorageResult<()>;

    /// Bumps `requested` to `now`
    fn touch_requested(&mut self, url: &str, now: DateTime<Utc>) -> StorageResult<()>;

    /// Deletes a profile row
    fn delete_profile(&mut self, url: &str) -> StorageResult<()>;

    /// Atomically leases one eligible profile
    ///
    /// Eligible rows are not disallowed, have fewer than three failures, have
    /// a graph node, are incomplete, flagged for refresh or stale, carry no
    /// unexpired lease, and do not belong to a throttled host or IP. Among
    /// them the row ordered first by `completed ASC, refresh DESC,
    /// fetched ASC, added ASC` is leased by setting `locked = now`.
    fn claim_next_profile(&mut self, windows: &ClaimWindows)
        -> StorageResult<Option<ProfileRecord>>;

    /// Sets the lease timestamp of a profile
    fn set_locked(&mut self, url: &str, locked: DateTime<Utc>) -> StorageResult<()>;

    /// Records a successful fetch and re-locks the profile until `relock`
    fn mark_fetched(
        &mut self,
        url: &str,
        now: DateTime<Utc>,
        relock: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Increments the failure counter
    fn increment_failed(&mut self, url: &str) -> StorageResult<()>;

    /// Marks a profile as disallowed by robots.txt
    fn set_disallowed(&mut self, url: &str) -> StorageResult<()>;

    /// Flags a profile for refresh and clears its failure and robots state
    ///
    /// Returns `None` when no such profile exists.
    fn force_refresh(
        &mut self,
        url: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ProfileRecord>>;

    // ===== Host throttle =====

    /// Advances the throttle record matching `host` or `ip` if its last claim
    /// is at or before `cutoff`; returns the number of records updated
    fn touch_host(
        &mut self,
        host: &str,
        ip: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<usize>;

    /// Inserts a first throttle record for a host
    ///
    /// Fails with [`StorageError::Conflict`] when the host or IP is taken.
    fn insert_host(&mut self, host: &str, ip: &str, now: DateTime<Utc>) -> StorageResult<()>;

    /// Last claim time of the record matching `host` or `ip`
    fn host_fetched(&self, host: &str, ip: &str) -> StorageResult<Option<DateTime<Utc>>>;

    // ===== Webhooks =====

    /// Stores a `(hook, url)` subscription
    ///
    /// Fails with [`StorageError::Conflict`] when it already exists.
    fn insert_webhook(&mut self, hook: &str, url: &str, now: DateTime<Utc>) -> StorageResult<()>;

    /// Claims every subscription for `url` that was never fired or was fired
    /// at or before `cutoff`, setting `fired = now`; returns the hooks
    fn claim_webhooks(
        &mut self,
        url: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<String>>;

    /// Deletes an acknowledged subscription
    fn delete_webhook(&mut self, hook: &str, url: &str) -> StorageResult<()>;

    /// Counts subscriptions for `url`
    fn count_webhooks(&self, url: &str) -> StorageResult<u64>;

    /// URLs with subscriptions whose last attempt is at or before `cutoff`
    fn webhook_urls_due(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<String>>;

    // ===== Statistics =====

    /// Row counts for reporting
    fn stats(&self, now: DateTime<Utc>, lock: chrono::Duration) -> StorageResult<StorageStats>;
}
