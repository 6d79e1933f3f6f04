//! Output module for printing lookup results and crawl statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::graph::FriendFeed;
use crate::spider::Lookup;
use serde_json::json;

/// Renders a lookup the way the lookup endpoint answers it
///
/// A resolved lookup is `{"urls": [...], "incomplete": true}` with
/// `incomplete` omitted unless set; a pending one is `{"pending": true}`.
pub fn lookup_json(lookup: &Lookup) -> serde_json::Value {
    match lookup {
        Lookup::Resolved(related) => json!(related),
        Lookup::Pending => json!({ "pending": true }),
    }
}

/// Formats friends and their feeds, one `friend feed` pair per line
pub fn format_friends_feeds(feeds: &[FriendFeed]) -> String {
    feeds
        .iter()
        .map(|f| format!("{} {}\n", f.url, f.feed))
        .collect()
}
