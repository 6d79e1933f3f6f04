//! Crawler module for profile fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with redirects turned into relations
//! - HTML parsing and relation extraction
//! - The per-profile fetch cycle
//! - The scheduler that claims profiles and drives cycles

mod fetcher;
mod parser;
mod pipeline;
mod scheduler;

pub use fetcher::{build_http_client, build_page_client, fetch_page, FetchResult};
pub use parser::{RelationExtractor, RelationType, Relations, FEED_TYPES};
pub use pipeline::{CrawlMetrics, CycleOutcome, FetchCycle, MetricsSnapshot};
pub use scheduler::{backoff_delay, NextStep, Scheduler};
