//! Per-host throttling
//!
//! A claim against a host (or any host sharing its IP) succeeds at most once
//! per throttle interval. The decision is made entirely by the persistent
//! store: a conditional update of an expired record, or the insert of a
//! first record. When a concurrent claimant already holds an unexpired
//! record the insert hits the host or IP uniqueness constraint, and that
//! conflict is the "throttled" answer.

use crate::storage::{Storage, StorageError, StorageResult};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Lease-based rate limiter keyed by host and IP
#[derive(Debug, Clone, Copy)]
pub struct HostThrottle {
    interval: Duration,
}

impl HostThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_timings(timings: &crate::config::Timings) -> Self {
        Self::new(timings.throttle())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Attempts to claim a fetch slot for `host`/`ip` at `now`
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The slot was granted and the record advanced
    /// * `Ok(false)` - The host or IP is throttled
    /// * `Err(StorageError)` - Any storage failure other than the conflict
    pub fn reserve(
        &self,
        storage: &mut dyn Storage,
        host: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        if storage.touch_host(host, ip, now, now - self.interval)? > 0 {
            return Ok(true);
        }

        match storage.insert_host(host, ip, now) {
            Ok(()) => Ok(true),
            Err(StorageError::Conflict(_)) => {
                debug!("Throttling {}", host);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
