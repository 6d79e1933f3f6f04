//! Profiles
//!
//! A profile is the crawl-state row of one URL together with its graph node.
//! Rows and nodes are created together the first time a URL is referenced,
//! whether as a crawl target, a discovered relation or an API request, and
//! destroyed together when the profile turns out to be unwanted.

mod lifecycle;

pub use lifecycle::RelationDiff;

use crate::context::CrawlContext;
use crate::graph::{queries, FriendFeed, GraphNode, Related};
use crate::state::ProfileState;
use crate::storage::{ClaimWindows, NewProfile, ProfileRecord, StorageError};
use crate::url::{extract_host, validate_url};
use crate::{RelcrawlError, Result, UrlError};
use tracing::debug;

/// A profile row and its graph node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    record: ProfileRecord,
    node: GraphNode,
}

impl Profile {
    pub fn url(&self) -> &str {
        &self.record.url
    }

    pub fn record(&self) -> &ProfileRecord {
        &self.record
    }

    pub fn node(&self) -> &GraphNode {
        &self.node
    }

    pub fn state(&self, windows: &ClaimWindows) -> ProfileState {
        ProfileState::of(Some(&self.record), windows)
    }

    /// Gets or creates the profile for `url`
    ///
    /// An existing profile is reused; only its `requested` timestamp is
    /// bumped when `requested` is set. Invalid URLs are rejected with
    /// [`RelcrawlError::InvalidUrl`].
    pub async fn create(ctx: &CrawlContext, url: &str, requested: bool) -> Result<Profile> {
        let parsed = validate_url(url)?;
        let url = parsed.as_str();
        let now = ctx.now();

        let existing = ctx.storage().get_profile(url)?;
        let mut record = match existing {
            Some(record) => record,
            None => {
                let host = extract_host(&parsed)
                    .ok_or_else(|| UrlError::MissingHost(url.to_string()))?;
                let ip = ctx.resolver.ip_for(&host).await;

                let inserted = ctx.storage().insert_profile(&NewProfile {
                    url,
                    host: &host,
                    ip: &ip,
                    now,
                    requested,
                });

                match inserted {
                    Ok(record) => {
                        debug!("Added profile {}", url);
                        return Self::attach_node(ctx, record);
                    }
                    // Created concurrently by another caller
                    Err(StorageError::Conflict(_)) => {
                        let record = ctx.storage().get_profile(url)?;
                        record.ok_or_else(|| StorageError::ProfileNotFound(url.to_string()))?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if requested {
            ctx.storage().touch_requested(url, now)?;
            record.requested = Some(now);
        }

        Self::attach_node(ctx, record)
    }

    /// Loads the profile of a claimed row; the row must have a node
    pub fn load(ctx: &CrawlContext, record: ProfileRecord) -> Result<Profile> {
        let id = record
            .node
            .ok_or_else(|| RelcrawlError::MissingNode(record.url.clone()))?;

        let node = ctx.graph().get_node(id)?;
        let node = node.ok_or_else(|| RelcrawlError::MissingNode(record.url.clone()))?;

        Ok(Profile { record, node })
    }

    /// Looks up an existing profile without creating one
    pub fn find(ctx: &CrawlContext, url: &str) -> Result<Option<Profile>> {
        let parsed = validate_url(url)?;
        let record = ctx.storage().get_profile(parsed.as_str())?;

        match record {
            Some(record) => Ok(Some(Self::attach_node(ctx, record)?)),
            None => Ok(None),
        }
    }

    /// Flags a profile for an immediate refresh, creating it when missing
    ///
    /// Clears the failure counter and the robots.txt denial so that a
    /// profile excluded by either is scheduled again.
    pub async fn force_refresh(ctx: &CrawlContext, url: &str) -> Result<Profile> {
        let parsed = validate_url(url)?;
        let record = ctx.storage().force_refresh(parsed.as_str(), ctx.now())?;

        match record {
            Some(record) => Self::attach_node(ctx, record),
            None => Self::create(ctx, parsed.as_str(), true).await,
        }
    }

    /// Re-reads the row and node from the stores
    pub fn reload(&mut self, ctx: &CrawlContext) -> Result<()> {
        let record = ctx.storage().get_profile(self.url())?;
        self.record = record.ok_or_else(|| StorageError::ProfileNotFound(self.url().to_string()))?;
        self.reload_node(ctx)
    }

    pub(crate) fn reload_node(&mut self, ctx: &CrawlContext) -> Result<()> {
        let node = ctx.graph().get_node(self.node.id)?;
        self.node = node.ok_or_else(|| RelcrawlError::MissingNode(self.url().to_string()))?;
        Ok(())
    }

    /// True when every node of this profile's identity cluster was attempted
    pub fn is_graph_complete(&self, ctx: &CrawlContext) -> Result<bool> {
        let graph = ctx.graph();
        Ok(queries::is_graph_complete(&*graph, &self.node, ctx.max_hops())?)
    }

    /// Canonical URLs of this profile's identity cluster
    pub fn related(&self, ctx: &CrawlContext) -> Result<Related> {
        let graph = ctx.graph();
        Ok(queries::get_related(&*graph, &self.node, ctx.max_hops())?)
    }

    /// One feed per friend of this profile's identity cluster
    pub fn friends_feeds(&self, ctx: &CrawlContext) -> Result<Vec<FriendFeed>> {
        let graph = ctx.graph();
        Ok(queries::get_friends_feeds(&*graph, &self.node, ctx.max_hops())?)
    }

    fn attach_node(ctx: &CrawlContext, mut record: ProfileRecord) -> Result<Profile> {
        let existing = match record.node {
            Some(id) => ctx.graph().get_node(id)?,
            None => None,
        };

        let node = match existing {
            Some(node) => node,
            None => {
                let node = ctx
                    .graph()
                    .create_node(&record.url, record.fetched.is_none())?;
                ctx.storage().set_profile_node(&record.url, node.id)?;
                record.node = Some(node.id);
                node
            }
        };

        Ok(Profile { record, node })
    }
}
