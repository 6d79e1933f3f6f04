//! Profile state transitions driven by a fetch cycle

use super::Profile;
use crate::context::CrawlContext;
use crate::crawler::Relations;
use crate::graph::NodePatch;
use crate::robots::{self, Crawlability};
use crate::webhook;
use crate::Result;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

/// Edge changes made by [`Profile::set_relations`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationDiff {
    pub kept: usize,
    pub removed: usize,
    pub added: usize,
}

impl RelationDiff {
    pub fn is_unchanged(&self) -> bool {
        self.removed == 0 && self.added == 0
    }
}

impl Profile {
    /// True when nothing needs this profile any more
    ///
    /// A profile is unwanted when it was never fetched, no edge of an
    /// enabled relation type points at it, and it was either never requested
    /// or requested longer ago than the configured maximum age.
    pub fn unwanted(&self, ctx: &CrawlContext) -> Result<bool> {
        if self.record.fetched.is_some() {
            return Ok(false);
        }

        let max_age = ctx.config.timings.max_age_without_request();
        if let Some(requested) = self.record.requested {
            if ctx.now() - requested <= max_age {
                return Ok(false);
            }
        }

        let incoming = ctx.graph().incoming(self.node.id, &ctx.extractor.kinds())?;
        Ok(incoming.is_empty())
    }

    /// Checks robots.txt for this profile's URL
    ///
    /// A denial is persisted as `disallowed`. An inconclusive robots.txt
    /// yields [`Crawlability::Unknown`] and changes nothing.
    pub async fn ensure_crawlable(&self, ctx: &CrawlContext) -> Result<Crawlability> {
        let page = Url::parse(self.url())?;
        let agent = &ctx.config.user_agent.crawler_name;

        let crawlability =
            robots::check_crawlable(&ctx.http_client, ctx.cache.as_ref(), &page, agent).await?;

        if crawlability == Crawlability::Denied {
            ctx.storage().set_disallowed(self.url())?;
        }

        Ok(crawlability)
    }

    /// Claims a fetch slot for this profile's host
    ///
    /// When the host is throttled the lease on this profile is released at
    /// once, so it can be claimed again as soon as the throttle clears.
    pub fn reserve_host(&self, ctx: &CrawlContext) -> Result<bool> {
        let now = ctx.now();

        let mut storage = ctx.storage();
        let reserved = ctx
            .throttle
            .reserve(&mut *storage, &self.record.host, &self.record.ip, now)?;

        if !reserved {
            storage.set_locked(self.url(), now - ctx.config.timings.lock())?;
        }

        Ok(reserved)
    }

    /// Records a successful fetch and fires webhooks the fetch completed
    ///
    /// The profile stays locked until `now + minMinutesBetweenRefresh -
    /// minutesToLock`, so the lease expires exactly when a refresh is
    /// allowed.
    pub async fn flag_as_fetched(&mut self, ctx: &CrawlContext) -> Result<()> {
        let now = ctx.now();
        let timings = &ctx.config.timings;

        ctx.graph().update_node(
            self.node.id,
            NodePatch {
                unfetched: Some(false),
                failed: Some(false),
                ..Default::default()
            },
        )?;

        let relock = now + timings.min_between_refresh() - timings.lock();
        ctx.storage().mark_fetched(self.url(), now, relock)?;

        self.reload(ctx)?;
        webhook::check_ready(ctx, &self.node).await
    }

    /// Records a failed attempt
    ///
    /// The node loses its unfetched marker, so a failed page counts as
    /// attempted when judging cluster completeness.
    pub async fn flag_as_failed(&mut self, ctx: &CrawlContext) -> Result<()> {
        info!("Marking page as failed: {}", self.url());

        ctx.storage().increment_failed(self.url())?;
        ctx.graph().update_node(
            self.node.id,
            NodePatch {
                unfetched: Some(false),
                failed: Some(true),
                ..Default::default()
            },
        )?;

        self.reload(ctx)?;

        if self.node.has_webhooks {
            webhook::fire(ctx, &self.node).await?;
        }
        webhook::check_ready(ctx, &self.node).await
    }

    /// Replaces this profile's outgoing relations with `relations`
    ///
    /// Edges whose target is still present are kept, edges whose target
    /// disappeared are deleted, and every new target gets a profile (created
    /// if needed) and an edge. References to the profile itself are ignored.
    pub async fn set_relations(
        &self,
        ctx: &CrawlContext,
        mut relations: Relations,
    ) -> Result<RelationDiff> {
        relations.remove_target(self.url());

        let kinds = ctx.extractor.kinds();
        let mut diff = RelationDiff::default();
        let mut kept = HashSet::new();

        let current = ctx.graph().outgoing(self.node.id, &kinds)?;
        for edge in current {
            let target = ctx.graph().get_node(edge.target)?;

            match target {
                Some(target) if relations.contains(edge.kind, &target.url) => {
                    debug!("Persisting old relation from {} to {}", self.url(), target.url);
                    kept.insert((edge.kind, target.url));
                    diff.kept += 1;
                }
                _ => {
                    debug!("Removing old relation {} from {}", edge.kind, self.url());
                    ctx.graph().delete_edge(edge.id)?;
                    diff.removed += 1;
                }
            }
        }

        for kind in kinds {
            let targets: Vec<String> = relations
                .targets(kind)
                .filter(|target| !kept.contains(&(kind, target.to_string())))
                .map(str::to_string)
                .collect();

            for target in targets {
                let profile = Profile::create(ctx, &target, false).await?;

                let created = ctx.graph().create_edge(self.node.id, profile.node.id, kind)?;
                if created {
                    debug!("Adding {} relation from {} to {}", kind, self.url(), target);
                    diff.added += 1;
                }
            }
        }

        Ok(diff)
    }

    /// Deletes the profile row and its node
    pub fn destroy(self, ctx: &CrawlContext) -> Result<()> {
        debug!("Destroying profile {}", self.url());
        ctx.graph().delete_node(self.node.id)?;
        ctx.storage().delete_profile(self.url())?;
        Ok(())
    }
}
