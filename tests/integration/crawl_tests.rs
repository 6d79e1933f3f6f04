//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! full crawl cycles end-to-end against a SQLite database on disk.

use chrono::{Duration as ChronoDuration, Utc};
use relcrawl::cache::MemoryCache;
use relcrawl::config::Config;
use relcrawl::context::{CrawlContext, SharedGraph, SharedStorage};
use relcrawl::crawler::{NextStep, Scheduler};
use relcrawl::graph::{EdgeKind, SqliteGraph};
use relcrawl::storage::{ClaimWindows, SqliteStorage};
use relcrawl::url::StaticResolver;
use relcrawl::{Lookup, Related, Spider};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration without host throttling
fn create_test_config(db_path: &Path) -> Config {
    let mut config = Config::default();
    config.timings.seconds_to_throttle = 0;
    config.storage.database_path = db_path.display().to_string();
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

/// Builds a context over the SQLite file at `db_path`
fn create_context(config: Config, db_path: &Path) -> CrawlContext {
    let storage: SharedStorage = Arc::new(Mutex::new(
        SqliteStorage::new(db_path).expect("Failed to open storage"),
    ));
    let graph: SharedGraph = Arc::new(Mutex::new(
        SqliteGraph::new(db_path).expect("Failed to open graph"),
    ));

    CrawlContext::new(
        config,
        storage,
        graph,
        Arc::new(MemoryCache::new()),
        Arc::new(StaticResolver::new()),
    )
    .expect("Failed to build context")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_robots_missing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

/// Claims and runs fetch cycles one at a time until nothing is eligible
async fn crawl_until_idle(scheduler: &Scheduler) -> usize {
    let mut cycles = 0;
    loop {
        match scheduler.next().expect("Failed to claim a profile") {
            NextStep::Claimed(record) => {
                scheduler.run_claimed(record).await;
                cycles += 1;
            }
            NextStep::Idle => return cycles,
            other => panic!("Unexpected scheduling step: {:?}", other),
        }
        assert!(cycles < 20, "Crawl did not settle");
    }
}

#[tokio::test]
async fn test_me_link_resolves_cluster() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());
    let bar = format!("{}/bar", server.uri());

    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(html(&format!(r#"<a rel="me" href="{}">Me</a>"#, bar)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bar"))
        .respond_with(html("<p>Nothing to see</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let spider = Spider::new(create_context(create_test_config(&db), &db));

    assert_eq!(spider.get_related(&foo, None).await.unwrap(), Lookup::Pending);

    let cycles = crawl_until_idle(spider.scheduler()).await;
    assert_eq!(cycles, 2);
    assert!(spider.scheduler().in_flight().is_empty());

    for url in [&foo, &bar] {
        let record = spider.context().storage().get_profile(url).unwrap().unwrap();
        assert!(record.completed, "{} should be completed", url);
        assert_eq!(record.failed, 0);
    }

    let lookup = spider.get_related(&foo, None).await.unwrap();
    let mut expected = vec![foo.clone(), bar.clone()];
    expected.sort();
    assert_eq!(
        lookup,
        Lookup::Resolved(Related {
            urls: expected,
            incomplete: false,
        })
    );

    let metrics = spider.scheduler().metrics();
    assert_eq!(metrics.crawled, 2);
    assert_eq!(metrics.succeeded, 2);
}

#[tokio::test]
async fn test_webhook_fires_when_cluster_completes() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());
    let bar = format!("{}/bar", server.uri());
    let hook = format!("{}/hook", server.uri());

    let mut related = vec![foo.clone(), bar.clone()];
    related.sort();

    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(html(&format!(r#"<a rel="me" href="{}">Me</a>"#, bar)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bar"))
        .respond_with(html(""))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(json!({ "url": foo, "related": related })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let spider = Spider::new(create_context(create_test_config(&db), &db));

    let lookup = spider.get_related(&foo, Some(&hook)).await.unwrap();
    assert_eq!(lookup, Lookup::Pending);
    assert_eq!(spider.context().storage().count_webhooks(&foo).unwrap(), 1);

    crawl_until_idle(spider.scheduler()).await;

    // Acknowledged subscriptions are removed
    assert_eq!(spider.context().storage().count_webhooks(&foo).unwrap(), 0);
    let node = spider
        .context()
        .graph()
        .find_node_by_url(&foo)
        .unwrap()
        .unwrap();
    assert!(!node.has_webhooks);
}

#[tokio::test]
async fn test_friend_feeds_survive_crawl() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());
    let friend = format!("{}/friend", server.uri());
    let feed_a = format!("{}/feed-a.xml", server.uri());
    let feed_b = format!("{}/feed-b.xml", server.uri());

    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(html(&format!(r#"<a rel="contact" href="{}">Friend</a>"#, friend)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/friend"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<html><head>
                <link rel="alternate" type="application/rss+xml" href="{}">
                <link rel="alternate" type="application/atom+xml" href="{}">
                <link rel="alternate" type="text/html" href="{}/mobile">
                </head><body></body></html>"#,
                feed_b,
                feed_a,
                server.uri()
            ),
            "text/html",
        ))
        .mount(&server)
        .await;
    for feed in ["/feed-a.xml", "/feed-b.xml"] {
        Mock::given(method("GET"))
            .and(path(feed))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<feed></feed>", "application/atom+xml"),
            )
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let mut config = create_test_config(&db);
    config.crawler.crawl_xfn = true;
    config.crawler.crawl_feeds = true;
    let spider = Spider::new(create_context(config, &db));
    spider.add_new_profile(&foo, true).await.unwrap();

    assert_eq!(crawl_until_idle(spider.scheduler()).await, 4);

    for url in [&friend, &feed_a, &feed_b] {
        let record = spider.context().storage().get_profile(url).unwrap();
        assert!(record.is_some(), "{} should still exist", url);
    }

    let feeds = spider.get_friends_feeds(&foo).await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].url, friend);
    assert_eq!(feeds[0].feed, feed_a);
}

#[tokio::test]
async fn test_permanent_redirect_becomes_alias() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());
    let canonical = format!("{}/canonical-foo", server.uri());

    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", canonical.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/canonical-foo"))
        .respond_with(html(""))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let spider = Spider::new(create_context(create_test_config(&db), &db));
    spider.add_new_profile(&foo, true).await.unwrap();

    crawl_until_idle(spider.scheduler()).await;

    let (edges, canonical_id) = {
        let graph = spider.context().graph();
        let source = graph.find_node_by_url(&foo).unwrap().unwrap();
        let target = graph.find_node_by_url(&canonical).unwrap().unwrap();
        let edges = graph.outgoing(source.id, &EdgeKind::ALL).unwrap();
        (edges, target.id)
    };

    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target, canonical_id);
    assert_eq!(edges[0].kind, EdgeKind::Alias);

    // Only the canonical URL is a leaf of the cluster
    let lookup = spider.get_related(&foo, None).await.unwrap();
    assert_eq!(
        lookup,
        Lookup::Resolved(Related {
            urls: vec![canonical],
            incomplete: false,
        })
    );
}

#[tokio::test]
async fn test_robots_disallow_excludes_profile() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("User-agent: *\nDisallow: /\n", "text/plain"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(html(""))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let config = create_test_config(&db);
    let timings = config.timings.clone();
    let spider = Spider::new(create_context(config, &db));
    spider.add_new_profile(&foo, true).await.unwrap();

    assert_eq!(crawl_until_idle(spider.scheduler()).await, 1);

    let record = spider.context().storage().get_profile(&foo).unwrap().unwrap();
    assert!(record.disallowed);
    assert_eq!(record.failed, 1);
    assert!(!record.completed);

    // Not eligible even once the lease and refresh windows have passed
    let later = ClaimWindows::from_timings(&timings, Utc::now() + ChronoDuration::days(30));
    let claimed = spider
        .context()
        .storage()
        .claim_next_profile(&later)
        .unwrap();
    assert!(claimed.is_none());

    // A forced refresh makes it eligible again
    spider.force_refresh(&foo).await.unwrap();
    let claimed = spider
        .context()
        .storage()
        .claim_next_profile(&later)
        .unwrap();
    assert_eq!(claimed.map(|r| r.url), Some(foo));
}

#[tokio::test]
async fn test_repeated_failures_stop_scheduling() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());

    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let mut config = create_test_config(&db);
    // Leases expire immediately so each failure can be retried at once
    config.timings.minutes_to_lock = 0;
    let spider = Spider::new(create_context(config, &db));
    spider.add_new_profile(&foo, true).await.unwrap();

    assert_eq!(crawl_until_idle(spider.scheduler()).await, 3);

    let record = spider.context().storage().get_profile(&foo).unwrap().unwrap();
    assert_eq!(record.failed, 3);
    assert!(!record.completed);

    // A failed leaf still counts as attempted, flagged incomplete
    let lookup = spider.get_related(&foo, None).await.unwrap();
    assert_eq!(
        lookup,
        Lookup::Resolved(Related {
            urls: vec![foo],
            incomplete: true,
        })
    );
}

#[tokio::test]
async fn test_lease_is_exclusive_across_processes() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");

    let first = create_context(create_test_config(&db), &db);
    let second = create_context(create_test_config(&db), &db);

    relcrawl::Profile::create(&first, "http://example.com/foo", true)
        .await
        .unwrap();

    let windows = ClaimWindows::from_timings(&first.config.timings, Utc::now());
    let claimed = first.storage().claim_next_profile(&windows).unwrap();
    assert_eq!(
        claimed.map(|r| r.url).as_deref(),
        Some("http://example.com/foo")
    );

    assert!(second.storage().claim_next_profile(&windows).unwrap().is_none());
}

#[tokio::test]
async fn test_running_scheduler_drains_on_close() {
    let server = MockServer::start().await;
    let foo = format!("{}/foo", server.uri());
    let bar = format!("{}/bar", server.uri());

    mount_robots_missing(&server).await;
    Mock::given(method("GET"))
        .and(path("/foo"))
        .respond_with(html(&format!(r#"<a rel="me" href="{}">Me</a>"#, bar)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bar"))
        .respond_with(html(""))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("crawl.db");
    let spider = Spider::new(create_context(create_test_config(&db), &db));
    spider.add_new_profile(&foo, true).await.unwrap();

    spider.start();

    let mut resolved = false;
    for _ in 0..200 {
        if let Lookup::Resolved(_) = spider.get_related(&foo, None).await.unwrap() {
            resolved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(resolved, "Cluster was not resolved in time");

    tokio::time::timeout(Duration::from_secs(5), spider.close())
        .await
        .expect("Close did not finish")
        .unwrap();

    assert!(spider.scheduler().in_flight().is_empty());
    assert!(spider.scheduler().is_closing());

    let stats = spider.statistics().unwrap();
    assert_eq!(stats.store.profiles, 2);
    assert_eq!(stats.store.completed, 2);
}
