//! Crawl scheduler
//!
//! This module handles:
//! - Claiming eligible profiles from the persistent store, one at a time
//! - Bounding the number of in-flight fetch cycles per process
//! - Exponential backoff while nothing is eligible
//! - Graceful shutdown that waits for in-flight cycles to drain
//!
//! There is a single driver loop per scheduler. Each claimed profile runs
//! its fetch cycle on its own task, and the loop immediately tries to claim
//! another. Mutual exclusion between processes lives in the store, so any
//! number of schedulers can share one database.

use crate::context::CrawlContext;
use crate::crawler::pipeline::{CrawlMetrics, CycleOutcome, FetchCycle, MetricsSnapshot};
use crate::storage::{ClaimWindows, ProfileRecord};
use crate::webhook;
use crate::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What one scheduling attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// A profile was leased and added to the in-flight set
    Claimed(ProfileRecord),
    /// Nothing is eligible right now
    Idle,
    /// The in-flight set is full
    AtCapacity,
    /// The scheduler is shutting down
    Closing,
}

/// Delay before the next claim attempt after `attempt` empty attempts
///
/// The delay is `2^(n-1)` seconds with `n` capped at `max_pause`.
pub fn backoff_delay(attempt: u32, max_pause: u32) -> Duration {
    let n = attempt.clamp(1, max_pause.max(1));
    Duration::from_secs(1u64 << (n - 1))
}

struct Shared {
    ctx: Arc<CrawlContext>,
    in_flight: Mutex<HashSet<String>>,
    slot_freed: Notify,
    drained: Notify,
    closing: watch::Sender<bool>,
    metrics: CrawlMetrics,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.ctx.config.crawler.parallel_fetches as usize
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    fn next(&self) -> Result<NextStep> {
        if self.is_closing() {
            debug!("Closing down - not going to queue anything new");
            return Ok(NextStep::Closing);
        }

        if self.in_flight().len() >= self.capacity() {
            debug!("Reached max parallel fetches!");
            return Ok(NextStep::AtCapacity);
        }

        let windows = ClaimWindows::from_timings(&self.ctx.config.timings, self.ctx.now());
        let claimed = self.ctx.storage().claim_next_profile(&windows)?;

        match claimed {
            Some(record) => {
                debug!("Initializing fetch of: {}", record.url);
                self.in_flight().insert(record.url.clone());
                Ok(NextStep::Claimed(record))
            }
            None => Ok(NextStep::Idle),
        }
    }

    fn release(&self, url: &str) {
        let remaining = {
            let mut in_flight = self.in_flight();
            in_flight.remove(url);
            in_flight.len()
        };

        if remaining == 0 {
            self.drained.notify_waiters();
        }

        // Only the removal that frees the first slot wakes the loop
        if remaining + 1 == self.capacity() {
            debug!("Freeing up fetches!");
            self.slot_freed.notify_one();
        }
    }

    async fn run_cycle(self: Arc<Self>, record: ProfileRecord) {
        let url = record.url.clone();

        let outcome = match FetchCycle::new(&self.ctx, &self.metrics, record) {
            Ok(cycle) => cycle.run().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(CycleOutcome::Fetched(diff)) => debug!(
                "Fetched {} ({} kept, {} added, {} removed)",
                url, diff.kept, diff.added, diff.removed
            ),
            Ok(outcome) => debug!("Fetch cycle for {} ended: {:?}", url, outcome),
            Err(e) => error!("Unexpected error while crawling {}: {}", url, e),
        }

        self.release(&url);
    }

    async fn drive(self: Arc<Self>) {
        let mut closing = self.closing.subscribe();
        let mut empty_attempts = 0u32;

        loop {
            let step = match self.next() {
                Ok(step) => step,
                Err(e) => {
                    error!("Failed to claim a profile: {}", e);
                    NextStep::Idle
                }
            };

            match step {
                NextStep::Closing => break,
                NextStep::Claimed(record) => {
                    empty_attempts = 0;
                    tokio::spawn(Arc::clone(&self).run_cycle(record));
                }
                NextStep::AtCapacity => {
                    tokio::select! {
                        _ = self.slot_freed.notified() => {}
                        _ = wait_closed(&mut closing) => break,
                    }
                }
                NextStep::Idle => {
                    let max_pause = self.ctx.config.timings.max_exponential_pause;
                    empty_attempts = (empty_attempts + 1).min(max_pause.max(1));
                    let delay = backoff_delay(empty_attempts, max_pause);

                    if let Err(e) = webhook::retry_due(&self.ctx).await {
                        warn!("Webhook retry sweep failed: {}", e);
                    }

                    debug!("No page found - pausing for {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wait_closed(&mut closing) => break,
                    }
                }
            }
        }

        debug!("Scheduler loop stopped");
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Bounded-concurrency crawl loop over the persistent store
pub struct Scheduler {
    shared: Arc<Shared>,
    started: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<CrawlContext>) -> Self {
        let (closing, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                ctx,
                in_flight: Mutex::new(HashSet::new()),
                slot_freed: Notify::new(),
                drained: Notify::new(),
                closing,
                metrics: CrawlMetrics::default(),
            }),
            started: AtomicBool::new(false),
            driver: Mutex::new(None),
        }
    }

    /// Starts the driver loop on the current runtime; later calls do nothing
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            "Starting crawler with up to {} parallel fetches",
            self.shared.capacity()
        );
        let handle = tokio::spawn(Arc::clone(&self.shared).drive());
        *self.driver.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Makes one scheduling attempt without starting the loop
    ///
    /// A claimed profile is added to the in-flight set; the caller must
    /// finish it with [`Scheduler::run_claimed`].
    pub fn next(&self) -> Result<NextStep> {
        self.shared.next()
    }

    /// Runs the fetch cycle of a profile claimed by [`Scheduler::next`]
    pub async fn run_claimed(&self, record: ProfileRecord) {
        Arc::clone(&self.shared).run_cycle(record).await
    }

    /// URLs currently being crawled
    pub fn in_flight(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.shared.in_flight().iter().cloned().collect();
        urls.sort();
        urls
    }

    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stops claiming and waits for in-flight cycles to finish
    ///
    /// A pending backoff is cancelled. Once the in-flight set is empty the
    /// cache is closed.
    pub async fn close(&self) -> Result<()> {
        info!("Closing crawler");
        self.shared.closing.send_replace(true);

        let driver = self
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = driver {
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }

        loop {
            let drained = self.shared.drained.notified();
            if self.shared.in_flight().is_empty() {
                break;
            }
            drained.await;
        }

        let metrics = self.metrics();
        info!(
            "Crawler closed: {} pages crawled, {} succeeded",
            metrics.crawled, metrics.succeeded
        );

        self.shared.ctx.cache.close()?;
        Ok(())
    }
}
