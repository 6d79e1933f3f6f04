//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{
    from_millis, to_millis, ClaimWindows, NewProfile, ProfileRecord, StorageStats, MAX_FAILURES,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const PROFILE_COLUMNS: &str =
    "url, host, ip, node, added, requested, fetched, locked, refresh, completed, disallowed, failed";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// Several processes may open the same file; writers wait on each other
    /// through the busy timeout instead of failing.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str, args: impl rusqlite::Params) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, args, |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRecord> {
    let optional_time = |idx: usize| -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row.get::<_, Option<i64>>(idx)?.map(from_millis))
    };

    Ok(ProfileRecord {
        url: row.get(0)?,
        host: row.get(1)?,
        ip: row.get(2)?,
        node: row.get(3)?,
        added: from_millis(row.get(4)?),
        requested: optional_time(5)?,
        fetched: optional_time(6)?,
        locked: optional_time(7)?,
        refresh: row.get(8)?,
        completed: row.get(9)?,
        disallowed: row.get(10)?,
        failed: row.get(11)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Profiles =====

    fn insert_profile(&mut self, profile: &NewProfile<'_>) -> StorageResult<ProfileRecord> {
        let now = to_millis(profile.now);
        let requested = profile.requested.then_some(now);

        let record = self.conn.query_row(
            &format!(
                "INSERT INTO urls (url, host, ip, added, requested) VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING {}",
                PROFILE_COLUMNS
            ),
            params![profile.url, profile.host, profile.ip, now, requested],
            profile_from_row,
        )?;

        Ok(record)
    }

    fn get_profile(&self, url: &str) -> StorageResult<Option<ProfileRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM urls WHERE url = ?1", PROFILE_COLUMNS),
                params![url],
                profile_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn get_profile_by_node(&self, node: i64) -> StorageResult<Option<ProfileRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM urls WHERE node = ?1", PROFILE_COLUMNS),
                params![node],
                profile_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn set_profile_node(&mut self, url: &str, node: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET node = ?1 WHERE url = ?2",
            params![node, url],
        )?;
        Ok(())
    }

    fn touch_requested(&mut self, url: &str, now: DateTime<Utc>) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET requested = ?1 WHERE url = ?2",
            params![to_millis(now), url],
        )?;
        Ok(())
    }

    fn delete_profile(&mut self, url: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM urls WHERE url = ?1", params![url])?;
        Ok(())
    }

    fn claim_next_profile(
        &mut self,
        windows: &ClaimWindows,
    ) -> StorageResult<Option<ProfileRecord>> {
        let now = to_millis(windows.now);
        let stale_before = to_millis(windows.now - windows.refresh_after);
        let lease_expired_at = to_millis(windows.now - windows.lock);
        let throttled_after = to_millis(windows.now - windows.throttle);

        // One statement: SQLite takes the write lock before evaluating the
        // subselect, so concurrent claimants serialize on it.
        let record = self
            .conn
            .query_row(
                &format!(
                    "UPDATE urls SET locked = ?1
                     WHERE url = (
                         SELECT u.url FROM urls u
                         WHERE u.disallowed = 0
                           AND u.failed < ?2
                           AND u.node IS NOT NULL
                           AND (u.completed = 0 OR u.refresh = 1 OR u.fetched < ?3)
                           AND (u.locked IS NULL OR u.locked <= ?4)
                           AND NOT EXISTS (
                               SELECT 1 FROM hosts h
                               WHERE (h.host = u.host OR h.ip = u.ip) AND h.fetched > ?5
                           )
                         ORDER BY u.completed ASC, u.refresh DESC, u.fetched ASC, u.added ASC
                         LIMIT 1
                     )
                     RETURNING {}",
                    PROFILE_COLUMNS
                ),
                params![now, MAX_FAILURES, stale_before, lease_expired_at, throttled_after],
                profile_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn set_locked(&mut self, url: &str, locked: DateTime<Utc>) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET locked = ?1 WHERE url = ?2",
            params![to_millis(locked), url],
        )?;
        Ok(())
    }

    fn mark_fetched(
        &mut self,
        url: &str,
        now: DateTime<Utc>,
        relock: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET fetched = ?1, failed = 0, refresh = 0, completed = 1, locked = ?2
             WHERE url = ?3",
            params![to_millis(now), to_millis(relock), url],
        )?;
        Ok(())
    }

    fn increment_failed(&mut self, url: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET failed = failed + 1 WHERE url = ?1",
            params![url],
        )?;
        Ok(())
    }

    fn set_disallowed(&mut self, url: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE urls SET disallowed = 1 WHERE url = ?1",
            params![url],
        )?;
        Ok(())
    }

    fn force_refresh(
        &mut self,
        url: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ProfileRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "UPDATE urls SET refresh = 1, requested = ?1, failed = 0, disallowed = 0
                     WHERE url = ?2
                     RETURNING {}",
                    PROFILE_COLUMNS
                ),
                params![to_millis(now), url],
                profile_from_row,
            )
            .optional()?;

        Ok(record)
    }

    // ===== Host throttle =====

    fn touch_host(
        &mut self,
        host: &str,
        ip: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let updated = self.conn.execute(
            "UPDATE hosts SET fetched = ?1, count = count + 1
             WHERE (host = ?2 OR ip = ?3) AND fetched <= ?4
               AND NOT EXISTS (
                   SELECT 1 FROM hosts
                   WHERE (host = ?2 OR ip = ?3) AND fetched > ?4
               )",
            params![to_millis(now), host, ip, to_millis(cutoff)],
        )?;
        Ok(updated)
    }

    fn insert_host(&mut self, host: &str, ip: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let now = to_millis(now);
        self.conn.execute(
            "INSERT INTO hosts (host, ip, added, fetched, count) VALUES (?1, ?2, ?3, ?3, 1)",
            params![host, ip, now],
        )?;
        Ok(())
    }

    fn host_fetched(&self, host: &str, ip: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let fetched: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(fetched) FROM hosts WHERE host = ?1 OR ip = ?2",
                params![host, ip],
                |row| row.get(0),
            )?;
        Ok(fetched.map(from_millis))
    }

    // ===== Webhooks =====

    fn insert_webhook(&mut self, hook: &str, url: &str, now: DateTime<Utc>) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO webhooks (hook, url, added) VALUES (?1, ?2, ?3)",
            params![hook, url, to_millis(now)],
        )?;
        Ok(())
    }

    fn claim_webhooks(
        &mut self,
        url: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "UPDATE webhooks SET fired = ?1
             WHERE url = ?2 AND (fired IS NULL OR fired <= ?3)
             RETURNING hook",
        )?;

        let hooks = stmt
            .query_map(params![to_millis(now), url, to_millis(cutoff)], |row| {
                row.get(0)
            })?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(hooks)
    }

    fn delete_webhook(&mut self, hook: &str, url: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM webhooks WHERE hook = ?1 AND url = ?2",
            params![hook, url],
        )?;
        Ok(())
    }

    fn count_webhooks(&self, url: &str) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM webhooks WHERE url = ?1", params![url])
    }

    fn webhook_urls_due(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT url FROM webhooks
             WHERE fired IS NULL OR fired <= ?1
             ORDER BY url",
        )?;

        let urls = stmt
            .query_map(params![to_millis(cutoff)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    // ===== Statistics =====

    fn stats(&self, now: DateTime<Utc>, lock: chrono::Duration) -> StorageResult<StorageStats> {
        Ok(StorageStats {
            profiles: self.count("SELECT COUNT(*) FROM urls", [])?,
            completed: self.count("SELECT COUNT(*) FROM urls WHERE completed = 1", [])?,
            failed_out: self.count(
                "SELECT COUNT(*) FROM urls WHERE failed >= ?1",
                params![MAX_FAILURES],
            )?,
            disallowed: self.count("SELECT COUNT(*) FROM urls WHERE disallowed = 1", [])?,
            locked: self.count(
                "SELECT COUNT(*) FROM urls WHERE locked > ?1",
                params![to_millis(now - lock)],
            )?,
            hosts: self.count("SELECT COUNT(*) FROM hosts", [])?,
            pending_webhooks: self.count("SELECT COUNT(*) FROM webhooks", [])?,
        })
    }
}
