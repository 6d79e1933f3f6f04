//! One fetch cycle
//!
//! A cycle starts with a leased profile row and runs it through the stages
//! in order: unwanted check, host reservation, robots.txt, fetch and
//! extraction, relation diff, and finally the fetched/failed transition.
//! Expected early exits are [`CycleOutcome`] variants, not errors.

use crate::context::CrawlContext;
use crate::crawler::fetcher::{fetch_page, FetchResult};
use crate::crawler::parser::Relations;
use crate::profile::{Profile, RelationDiff};
use crate::robots::Crawlability;
use crate::storage::ProfileRecord;
use crate::{RelcrawlError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use url::Url;

/// Crawl counters of one scheduler
#[derive(Debug, Default)]
pub struct CrawlMetrics {
    crawled: AtomicU64,
    succeeded: AtomicU64,
}

/// Point-in-time copy of [`CrawlMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Pages requested
    pub crawled: u64,
    /// Pages whose relations were stored
    pub succeeded: u64,
}

impl CrawlMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            crawled: self.crawled.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
        }
    }
}

/// How a fetch cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Relations were stored and the profile flagged as fetched
    Fetched(RelationDiff),
    /// The profile was no longer needed and has been destroyed
    Unwanted,
    /// The host was claimed too recently; the lease was released
    Throttled,
    /// robots.txt denies this crawler; counted as a failure
    Disallowed,
    /// robots.txt could not be read conclusively; counted as a failure
    RobotsUnknown,
    /// Fetching or storing relations failed; counted as a failure
    Failed(String),
}

/// State carried through the stages of one cycle
pub struct FetchCycle<'a> {
    ctx: &'a CrawlContext,
    metrics: &'a CrawlMetrics,
    profile: Profile,
}

impl<'a> FetchCycle<'a> {
    /// Starts a cycle for a leased row
    pub fn new(
        ctx: &'a CrawlContext,
        metrics: &'a CrawlMetrics,
        record: ProfileRecord,
    ) -> Result<Self> {
        let profile = Profile::load(ctx, record)?;
        Ok(Self {
            ctx,
            metrics,
            profile,
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Runs every stage
    ///
    /// Errors are unexpected faults; every expected way for a cycle to end
    /// is an `Ok` outcome.
    pub async fn run(mut self) -> Result<CycleOutcome> {
        let ctx = self.ctx;
        let url = self.profile.url().to_string();

        let unwanted = self.profile.unwanted(ctx)?;
        debug!("{}: {}", if unwanted { "Unwanted" } else { "Wanted" }, url);
        if unwanted {
            self.profile.destroy(ctx)?;
            return Ok(CycleOutcome::Unwanted);
        }

        let reserved = self.profile.reserve_host(ctx)?;
        debug!(
            "{} host for: {}",
            if reserved { "Unthrottled" } else { "Throttled" },
            url
        );
        if !reserved {
            return Ok(CycleOutcome::Throttled);
        }

        let crawlability = match self.profile.ensure_crawlable(ctx).await {
            Ok(crawlability) => crawlability,
            Err(e) => {
                self.profile.flag_as_failed(ctx).await?;
                return Err(e);
            }
        };

        match crawlability {
            Crawlability::Allowed => debug!("Allowed crawling for: {}", url),
            Crawlability::Denied => {
                debug!("Disallowed crawling for: {}", url);
                self.profile.flag_as_failed(ctx).await?;
                return Ok(CycleOutcome::Disallowed);
            }
            Crawlability::Unknown => {
                self.profile.flag_as_failed(ctx).await?;
                return Ok(CycleOutcome::RobotsUnknown);
            }
        }

        let stored = match self.find_relations().await {
            Ok(relations) => self.profile.set_relations(ctx, relations).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(diff) => {
                self.metrics.succeeded.fetch_add(1, Ordering::Relaxed);
                self.profile.flag_as_fetched(ctx).await?;
                Ok(CycleOutcome::Fetched(diff))
            }
            Err(e) => {
                warn!("Failed to fetch page {}: {}", url, e);
                self.profile.flag_as_failed(ctx).await?;
                Ok(CycleOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Fetches the page and turns the response into relations
    async fn find_relations(&self) -> Result<Relations> {
        let page = Url::parse(self.profile.url())?;
        debug!("Fetching {} ...", page);

        self.metrics.crawled.fetch_add(1, Ordering::Relaxed);

        match fetch_page(&self.ctx.page_client, &page).await? {
            FetchResult::Redirect { status, location } => {
                debug!("Redirect {} from {} to {}", status, page, location);
                Ok(Relations::from_redirect(status, &location))
            }
            FetchResult::Html { body } => Ok(self.ctx.extractor.extract(&body, &page)),
            FetchResult::Empty => Ok(Relations::new()),
            FetchResult::Unsupported { content_type } => {
                warn!(
                    "Non-supported content-type for {}: {}",
                    page,
                    content_type.as_deref().unwrap_or("no content type at all")
                );
                Ok(Relations::new())
            }
            FetchResult::HttpError { status } => Err(RelcrawlError::HttpStatus {
                url: page.to_string(),
                status,
            }),
        }
    }
}
