//! Shared crawl context
//!
//! Everything a fetch cycle or an API call needs: configuration, the two
//! stores, the cache, HTTP clients and the host resolver. One context is
//! built per process and shared behind an `Arc`.

use crate::cache::{open_cache, Cache};
use crate::config::Config;
use crate::crawler::{build_http_client, build_page_client, RelationExtractor};
use crate::graph::{GraphStore, SqliteGraph};
use crate::state::HostThrottle;
use crate::storage::{open_storage, Storage};
use crate::url::{HostResolver, SystemResolver};
use crate::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Persistent store shared between tasks
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Graph store shared between tasks
pub type SharedGraph = Arc<Mutex<dyn GraphStore + Send>>;

pub struct CrawlContext {
    pub config: Config,
    storage: SharedStorage,
    graph: SharedGraph,
    pub cache: Arc<dyn Cache>,
    /// Client for profile pages; never follows redirects
    pub page_client: Client,
    /// Client for robots.txt and webhooks
    pub http_client: Client,
    pub resolver: Arc<dyn HostResolver>,
    pub throttle: HostThrottle,
    pub extractor: RelationExtractor,
}

impl CrawlContext {
    pub fn new(
        config: Config,
        storage: SharedStorage,
        graph: SharedGraph,
        cache: Arc<dyn Cache>,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self> {
        let page_client = build_page_client(&config)?;
        let http_client = build_http_client(&config)?;
        let throttle = HostThrottle::from_timings(&config.timings);
        let extractor = RelationExtractor::from_config(&config.crawler);

        Ok(Self {
            config,
            storage,
            graph,
            cache,
            page_client,
            http_client,
            resolver,
            throttle,
            extractor,
        })
    }

    /// Opens the SQLite stores and cache named by `config`
    pub fn open(config: Config) -> Result<Self> {
        let path = Path::new(&config.storage.database_path);
        let storage: SharedStorage = Arc::new(Mutex::new(open_storage(path)?));
        let graph: SharedGraph = Arc::new(Mutex::new(SqliteGraph::new(path)?));
        let cache = open_cache(&config)?;

        Self::new(config, storage, graph, cache, Arc::new(SystemResolver))
    }

    /// Locks the persistent store
    ///
    /// The guard must be dropped before the next await point.
    pub fn storage(&self) -> MutexGuard<'_, dyn Storage + Send + 'static> {
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks the graph store
    pub fn graph(&self) -> MutexGuard<'_, dyn GraphStore + Send + 'static> {
        self.graph.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_hops(&self) -> u32 {
        self.config.crawler.max_jumps_away
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
