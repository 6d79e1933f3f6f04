//! Profile lifecycle states
//!
//! The state is never stored; it is derived from the `urls` row so that
//! lease expiry needs no sweeper.

use crate::storage::{ClaimWindows, ProfileRecord, MAX_FAILURES};
use std::fmt;

/// Lifecycle position of a profile URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileState {
    /// No row exists for the URL
    Unborn,

    /// Waiting to be claimed (new, flagged for refresh, or stale)
    Queued,

    /// Claimed by a worker whose lease has not expired
    Leased,

    /// Fetched and not yet due for a refresh
    Fetched,

    /// Excluded after too many failed attempts
    Failed,

    /// Excluded by robots.txt
    Disallowed,
}

fn lease_active(record: &ProfileRecord, windows: &ClaimWindows) -> bool {
    record
        .locked
        .map_or(false, |locked| locked > windows.now - windows.lock)
}

impl ProfileState {
    /// Derives the state of a (possibly missing) profile row
    pub fn of(record: Option<&ProfileRecord>, windows: &ClaimWindows) -> Self {
        let Some(record) = record else {
            return Self::Unborn;
        };

        if record.disallowed {
            return Self::Disallowed;
        }
        if record.failed >= MAX_FAILURES {
            return Self::Failed;
        }

        let fresh = record.completed
            && !record.refresh
            && record
                .fetched
                .map_or(false, |fetched| fetched >= windows.now - windows.refresh_after);

        if fresh {
            Self::Fetched
        } else if lease_active(record, windows) {
            Self::Leased
        } else {
            Self::Queued
        }
    }

    /// Returns true if only a forced refresh brings the profile back
    pub fn needs_force_refresh(&self) -> bool {
        matches!(self, Self::Failed | Self::Disallowed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unborn => "unborn",
            Self::Queued => "queued",
            Self::Leased => "leased",
            Self::Fetched => "fetched",
            Self::Failed => "failed",
            Self::Disallowed => "disallowed",
        }
    }
}

impl fmt::Display for ProfileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
