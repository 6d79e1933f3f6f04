//! Identity graph
//!
//! Profiles are nodes; typed, directed edges record what a page said about
//! other pages:
//! - `me`: the same person or entity elsewhere
//! - `alias`: pointer from a non-preferred URL to its canonical form
//! - `friend`: XFN `contact` links (optional)
//! - `feed`: `alternate` feed links (optional)
//!
//! [`GraphStore`] provides node and edge primitives; the bounded traversals
//! that answer "is this cluster resolved" live in [`queries`] and work
//! against any store.

pub mod queries;
mod sqlite;
mod traits;

pub use queries::{FriendFeed, Related};
pub use sqlite::SqliteGraph;
pub use traits::{GraphError, GraphResult, GraphStore};

use std::fmt;
use std::str::FromStr;

/// A profile node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: i64,
    pub url: String,
    /// Set until the profile is fetched or fails for the first time
    pub unfetched: bool,
    /// Set when the latest attempt failed
    pub failed: bool,
    /// Set while webhook subscriptions are pending for this URL
    pub has_webhooks: bool,
}

/// Partial update of node markers; `None` leaves a marker unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodePatch {
    pub unfetched: Option<bool>,
    pub failed: Option<bool>,
    pub has_webhooks: Option<bool>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.unfetched.is_none() && self.failed.is_none() && self.has_webhooks.is_none()
    }
}

/// Edge types of the identity graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Me,
    Alias,
    Friend,
    Feed,
}

impl EdgeKind {
    /// Kinds that join pages into one identity cluster
    pub const IDENTITY: [EdgeKind; 2] = [EdgeKind::Me, EdgeKind::Alias];

    pub const ALL: [EdgeKind; 4] = [EdgeKind::Me, EdgeKind::Alias, EdgeKind::Friend, EdgeKind::Feed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Me => "me",
            Self::Alias => "alias",
            Self::Friend => "friend",
            Self::Feed => "feed",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "me" => Ok(Self::Me),
            "alias" => Ok(Self::Alias),
            "friend" => Ok(Self::Friend),
            "feed" => Ok(Self::Feed),
            other => Err(GraphError::UnknownEdgeKind(other.to_string())),
        }
    }
}

/// A directed, typed edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: i64,
    pub source: i64,
    pub target: i64,
    pub kind: EdgeKind,
}
