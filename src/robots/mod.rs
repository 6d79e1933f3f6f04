//! Robots.txt handling module
//!
//! robots.txt bodies are fetched through the shared cache:
//! - 200: the body, cached for a day
//! - 404 or 410: an empty body (allow everything), cached for a day
//! - any other status: inconclusive, remembered for two hours
//! - transport errors: surfaced, not cached

mod parser;

pub use parser::RobotsRules;

use crate::cache::Cache;
use crate::{RelcrawlError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// TTL for a conclusive robots.txt answer
pub const ROBOTS_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// TTL for an inconclusive answer
pub const FAILURE_TTL: Duration = Duration::from_secs(60 * 60 * 2);

/// What the cache remembers about a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CachedFetch {
    Body(String),
    Fail,
}

/// Result of checking a profile URL against its robots.txt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crawlability {
    Allowed,
    Denied,
    /// robots.txt could not be read conclusively; try again later
    Unknown,
}

/// Returns the robots.txt URL for a page
pub fn robots_url(page: &Url) -> Result<Url> {
    Ok(page.join("/robots.txt")?)
}

/// Fetches `url` through the cache
///
/// # Returns
///
/// * `Ok(Some(body))` - The body; empty for 404/410
/// * `Ok(None)` - Inconclusive status (cached as a failure)
/// * `Err(RelcrawlError)` - Transport or cache failure
pub async fn fetch_cached(
    client: &reqwest::Client,
    cache: &dyn Cache,
    url: &str,
    ttl: Duration,
) -> Result<Option<String>> {
    let key = format!("fetch:{}", url);

    if let Some(raw) = cache.get(&key)? {
        match serde_json::from_str::<CachedFetch>(&raw) {
            Ok(CachedFetch::Body(body)) => {
                debug!("Found cache for {}", url);
                return Ok(Some(body));
            }
            Ok(CachedFetch::Fail) => {
                debug!("Found cached failure for {}", url);
                return Ok(None);
            }
            Err(e) => warn!("Ignoring unreadable cache entry for {}: {}", url, e),
        }
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RelcrawlError::Http {
            url: url.to_string(),
            source: e,
        })?;

    let status = response.status().as_u16();
    let (entry, ttl) = match status {
        200 => {
            let body = response.text().await.map_err(|e| RelcrawlError::Http {
                url: url.to_string(),
                source: e,
            })?;
            (CachedFetch::Body(body), ttl)
        }
        404 | 410 => (CachedFetch::Body(String::new()), ttl),
        _ => {
            debug!("Inconclusive status {} for {}", status, url);
            (CachedFetch::Fail, FAILURE_TTL)
        }
    };

    cache.set(&key, &serde_json::to_string(&entry)?, ttl)?;

    Ok(match entry {
        CachedFetch::Body(body) => Some(body),
        CachedFetch::Fail => None,
    })
}

/// Checks whether `page` may be crawled by `agent`
pub async fn check_crawlable(
    client: &reqwest::Client,
    cache: &dyn Cache,
    page: &Url,
    agent: &str,
) -> Result<Crawlability> {
    let robots = robots_url(page)?;

    let body = fetch_cached(client, cache, robots.as_str(), ROBOTS_TTL)
        .await
        .map_err(|e| RelcrawlError::Robots {
            url: page.to_string(),
            message: e.to_string(),
        })?;

    let Some(body) = body else {
        warn!("robots.txt for {} is inconclusive", page);
        return Ok(Crawlability::Unknown);
    };

    if RobotsRules::from_content(&body).is_allowed(page.as_str(), agent) {
        Ok(Crawlability::Allowed)
    } else {
        Ok(Crawlability::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[test]
    fn test_robots_url() {
        let page = Url::parse("http://example.com/some/page?x=1").unwrap();
        assert_eq!(
            robots_url(&page).unwrap().as_str(),
            "http://example.com/robots.txt"
        );
    }

    #[tokio::test]
    async fn test_fetch_cached_hits_network_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow:"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = MemoryCache::new();
        let url = format!("{}/robots.txt", server.uri());

        for _ in 0..2 {
            let body = fetch_cached(&client(), &cache, &url, ROBOTS_TTL)
                .await
                .unwrap();
            assert_eq!(body.as_deref(), Some("User-agent: *\nDisallow:"));
        }
    }

    #[tokio::test]
    async fn test_fetch_cached_missing_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cache = MemoryCache::new();
        let url = format!("{}/robots.txt", server.uri());
        let body = fetch_cached(&client(), &cache, &url, ROBOTS_TTL)
            .await
            .unwrap();
        assert_eq!(body.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_fetch_cached_server_error_is_inconclusive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let cache = MemoryCache::new();
        let url = format!("{}/robots.txt", server.uri());

        for _ in 0..2 {
            let body = fetch_cached(&client(), &cache, &url, ROBOTS_TTL)
                .await
                .unwrap();
            assert_eq!(body, None);
        }
    }

    #[tokio::test]
    async fn test_check_crawlable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: Relcrawl\nDisallow: /private"),
            )
            .mount(&server)
            .await;

        let cache = MemoryCache::new();
        let open = Url::parse(&format!("{}/foo", server.uri())).unwrap();
        let closed = Url::parse(&format!("{}/private/foo", server.uri())).unwrap();

        assert_eq!(
            check_crawlable(&client(), &cache, &open, "Relcrawl")
                .await
                .unwrap(),
            Crawlability::Allowed
        );
        assert_eq!(
            check_crawlable(&client(), &cache, &closed, "Relcrawl")
                .await
                .unwrap(),
            Crawlability::Denied
        );
        assert_eq!(
            check_crawlable(&client(), &cache, &closed, "OtherBot")
                .await
                .unwrap(),
            Crawlability::Allowed
        );
    }

    #[tokio::test]
    async fn test_check_crawlable_network_error() {
        let cache = MemoryCache::new();
        let page = Url::parse("http://127.0.0.1:1/foo").unwrap();

        let result = check_crawlable(&client(), &cache, &page, "Relcrawl").await;
        assert!(matches!(result, Err(RelcrawlError::Robots { .. })));
    }
}
