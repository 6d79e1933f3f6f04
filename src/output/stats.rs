//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the persistent store and the graph store.

use crate::crawler::MetricsSnapshot;
use crate::graph::{EdgeKind, GraphStore};
use crate::storage::{Storage, StorageStats};
use crate::Result;
use chrono::{DateTime, Duration, Utc};

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Row counts of the persistent store
    pub store: StorageStats,

    /// Number of graph edges per kind
    pub edges_by_kind: Vec<(EdgeKind, u64)>,

    /// Counters of the scheduler in this process, if one ran
    pub metrics: Option<MetricsSnapshot>,
}

impl CrawlStatistics {
    pub fn total_edges(&self) -> u64 {
        self.edges_by_kind.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from both stores
///
/// # Arguments
///
/// * `storage` - The persistent store to query
/// * `graph` - The graph store to query
/// * `now` - Reference time for counting live leases
/// * `lock` - Lease length
pub fn load_statistics(
    storage: &dyn Storage,
    graph: &dyn GraphStore,
    now: DateTime<Utc>,
    lock: Duration,
) -> Result<CrawlStatistics> {
    Ok(CrawlStatistics {
        store: storage.stats(now, lock)?,
        edges_by_kind: graph.count_edges()?,
        metrics: None,
    })
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    let store = &stats.store;

    println!("=== Crawl Statistics ===\n");

    println!("Profiles:");
    println!("  Total profiles: {}", store.profiles);
    println!(
        "  Completed: {} ({:.1}%)",
        store.completed,
        percentage(store.completed, store.profiles)
    );
    println!(
        "  Failed out: {} ({:.1}%)",
        store.failed_out,
        percentage(store.failed_out, store.profiles)
    );
    println!(
        "  Disallowed: {} ({:.1}%)",
        store.disallowed,
        percentage(store.disallowed, store.profiles)
    );
    println!("  Currently locked: {}", store.locked);
    println!();

    println!("Hosts seen: {}", store.hosts);
    println!("Pending webhooks: {}", store.pending_webhooks);
    println!();

    println!("Relations ({} total):", stats.total_edges());
    for (kind, count) in &stats.edges_by_kind {
        println!("  {}: {}", kind, count);
    }
    println!();

    if let Some(metrics) = stats.metrics {
        println!(
            "Success Rate: {:.1}% ({} / {} fetches stored relations)",
            percentage(metrics.succeeded, metrics.crawled),
            metrics.succeeded,
            metrics.crawled
        );
    }
}
