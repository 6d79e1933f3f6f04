//! Crawler facade
//!
//! [`Spider`] owns the shared context and the scheduler and exposes the
//! operations an API or CLI layer needs.

use crate::config::Config;
use crate::context::CrawlContext;
use crate::crawler::Scheduler;
use crate::graph::FriendFeed;
use crate::output::{load_statistics, CrawlStatistics};
use crate::profile::Profile;
use crate::state::ProfileState;
use crate::storage::ClaimWindows;
use crate::webhook;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

pub use crate::graph::Related;

/// Answer to a related-URLs lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The identity cluster is completely crawled
    Resolved(Related),
    /// Some pages of the cluster have not been attempted yet
    Pending,
}

pub struct Spider {
    ctx: Arc<CrawlContext>,
    scheduler: Scheduler,
}

impl Spider {
    pub fn new(ctx: CrawlContext) -> Self {
        let ctx = Arc::new(ctx);
        let scheduler = Scheduler::new(Arc::clone(&ctx));
        Self { ctx, scheduler }
    }

    /// Opens the stores and cache named by `config`
    pub fn open(config: Config) -> Result<Self> {
        Ok(Self::new(CrawlContext::open(config)?))
    }

    pub fn context(&self) -> &CrawlContext {
        &self.ctx
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Adds a profile, or reuses the existing one
    pub async fn add_new_profile(&self, url: &str, requested: bool) -> Result<Profile> {
        Profile::create(&self.ctx, url, requested).await
    }

    /// Queues a profile for an immediate refresh
    pub async fn force_refresh(&self, url: &str) -> Result<Profile> {
        Profile::force_refresh(&self.ctx, url).await
    }

    /// Related URLs of `url`, once its identity cluster is fully crawled
    ///
    /// The profile is created (as requested) if needed. While the cluster
    /// is incomplete the answer is [`Lookup::Pending`]; with a `webhook`,
    /// the callback is registered and receives the answer later.
    pub async fn get_related(&self, url: &str, webhook: Option<&str>) -> Result<Lookup> {
        let profile = Profile::create(&self.ctx, url, true).await?;

        if profile.is_graph_complete(&self.ctx)? {
            return Ok(Lookup::Resolved(profile.related(&self.ctx)?));
        }

        if let Some(hook) = webhook {
            webhook::register(&self.ctx, &profile, hook).await?;
        }

        debug!("Lookup of {} is pending", profile.url());
        Ok(Lookup::Pending)
    }

    /// Lifecycle state of `url`, derived from its stored row
    pub fn profile_state(&self, url: &str) -> Result<ProfileState> {
        let windows = ClaimWindows::from_timings(&self.ctx.config.timings, self.ctx.now());
        let state = match Profile::find(&self.ctx, url)? {
            Some(profile) => profile.state(&windows),
            None => ProfileState::of(None, &windows),
        };
        Ok(state)
    }

    /// One feed per friend of the identity cluster of `url`
    pub async fn get_friends_feeds(&self, url: &str) -> Result<Vec<FriendFeed>> {
        let profile = Profile::create(&self.ctx, url, true).await?;
        profile.friends_feeds(&self.ctx)
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stops the scheduler once in-flight fetches are done
    pub async fn close(&self) -> Result<()> {
        self.scheduler.close().await
    }

    pub fn statistics(&self) -> Result<CrawlStatistics> {
        let now = self.ctx.now();
        let lock = self.ctx.config.timings.lock();

        let storage = self.ctx.storage();
        let graph = self.ctx.graph();
        let mut stats = load_statistics(&*storage, &*graph, now, lock)?;
        stats.metrics = Some(self.scheduler.metrics());

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::tests::test_context;
    use crate::RelcrawlError;

    fn spider() -> Spider {
        Spider::new(test_context(Config::default()))
    }

    #[tokio::test]
    async fn test_get_related_pending_for_new_profile() {
        let spider = spider();
        let lookup = spider
            .get_related("http://example.com/foo", None)
            .await
            .unwrap();
        assert_eq!(lookup, Lookup::Pending);

        let profile = Profile::find(spider.context(), "http://example.com/foo")
            .unwrap()
            .unwrap();
        assert!(profile.record().requested.is_some());
    }

    #[tokio::test]
    async fn test_get_related_resolved_after_fetch() {
        let spider = spider();
        let mut profile = spider
            .add_new_profile("http://example.com/foo", true)
            .await
            .unwrap();
        profile.flag_as_fetched(spider.context()).await.unwrap();

        let lookup = spider
            .get_related("http://example.com/foo", None)
            .await
            .unwrap();
        assert_eq!(
            lookup,
            Lookup::Resolved(Related {
                urls: vec!["http://example.com/foo".to_string()],
                incomplete: false,
            })
        );
    }

    #[tokio::test]
    async fn test_get_related_invalid_url_is_client_error() {
        let spider = spider();
        let err = spider.get_related("not a url", None).await.unwrap_err();
        assert!(matches!(err, RelcrawlError::InvalidUrl(_)));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_get_related_registers_webhook() {
        let spider = spider();
        let lookup = spider
            .get_related("http://example.com/foo", Some("http://hooks.test/cb"))
            .await
            .unwrap();
        assert_eq!(lookup, Lookup::Pending);

        let count = spider
            .context()
            .storage()
            .count_webhooks("http://example.com/foo")
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_profile_state_follows_failures_and_refresh() {
        let spider = spider();
        let url = "http://example.com/foo";
        assert_eq!(spider.profile_state(url).unwrap(), ProfileState::Unborn);

        let mut profile = spider.add_new_profile(url, true).await.unwrap();
        assert_eq!(spider.profile_state(url).unwrap(), ProfileState::Queued);

        for _ in 0..3 {
            profile.flag_as_failed(spider.context()).await.unwrap();
        }
        let state = spider.profile_state(url).unwrap();
        assert_eq!(state, ProfileState::Failed);
        assert!(state.needs_force_refresh());

        spider.force_refresh(url).await.unwrap();
        assert_eq!(spider.profile_state(url).unwrap(), ProfileState::Queued);
    }

    #[tokio::test]
    async fn test_statistics() {
        let spider = spider();
        spider
            .add_new_profile("http://example.com/foo", true)
            .await
            .unwrap();

        let stats = spider.statistics().unwrap();
        assert_eq!(stats.store.profiles, 1);
        assert_eq!(stats.metrics.unwrap().crawled, 0);
    }
}
