use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for relcrawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default, rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of concurrently in-flight fetch pipelines per process
    #[serde(default = "default_parallel_fetches")]
    pub parallel_fetches: u32,

    /// Hop bound for every identity-graph traversal
    #[serde(default = "default_max_jumps_away")]
    pub max_jumps_away: u32,

    /// Also parse XFN `rel="contact"` relations as friends
    #[serde(default)]
    pub crawl_xfn: bool,

    /// Also parse `rel="alternate"` feed links
    #[serde(default)]
    pub crawl_feeds: bool,

    /// Timeout for every outgoing request, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Redirect cap for robots.txt and webhook requests
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            parallel_fetches: default_parallel_fetches(),
            max_jumps_away: default_max_jumps_away(),
            crawl_xfn: false,
            crawl_feeds: false,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// Lease, throttle and refresh windows
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Timings {
    /// Minimum interval between two fetch claims against one host or IP
    #[serde(default = "default_seconds_to_throttle")]
    pub seconds_to_throttle: u64,

    /// Cap on the exponent of the idle backoff (delay is 2^(n-1) seconds)
    #[serde(default = "default_max_exponential_pause")]
    pub max_exponential_pause: u32,

    /// How long a request keeps an unreferenced profile alive
    #[serde(default = "default_max_age_without_request_secs")]
    pub max_age_without_request_secs: u64,

    /// Minimum spacing between two fetches of the same profile
    #[serde(default = "default_min_minutes_between_refresh")]
    pub min_minutes_between_refresh: i64,

    /// Lease length; also the webhook re-fire lock
    #[serde(default = "default_minutes_to_lock")]
    pub minutes_to_lock: i64,

    /// Age after which a completed profile is due for a refresh
    #[serde(default = "default_minutes_until_refresh")]
    pub minutes_until_refresh: i64,
}

impl Timings {
    pub fn throttle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds_to_throttle as i64)
    }

    pub fn lock(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes_to_lock)
    }

    pub fn refresh_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes_until_refresh)
    }

    pub fn min_between_refresh(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.min_minutes_between_refresh)
    }

    pub fn max_age_without_request(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_age_without_request_secs as i64)
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            seconds_to_throttle: default_seconds_to_throttle(),
            max_exponential_pause: default_max_exponential_pause(),
            max_age_without_request_secs: default_max_age_without_request_secs(),
            min_minutes_between_refresh: default_min_minutes_between_refresh(),
            minutes_to_lock: default_minutes_to_lock(),
            minutes_until_refresh: default_minutes_until_refresh(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler; also the agent token matched in robots.txt
    #[serde(default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(default = "default_contact_url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: default_contact_url(),
        }
    }
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database shared by the profile and graph stores
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Which cache backend to use for robots.txt lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// SQLite file for the `sqlite` backend; defaults to the database path
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.fetch_timeout_secs)
    }
}

fn default_parallel_fetches() -> u32 {
    60
}

fn default_max_jumps_away() -> u32 {
    40
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

fn default_max_redirects() -> usize {
    9
}

fn default_seconds_to_throttle() -> u64 {
    10
}

fn default_max_exponential_pause() -> u32 {
    4
}

fn default_max_age_without_request_secs() -> u64 {
    60 * 60 * 24 * 7
}

fn default_min_minutes_between_refresh() -> i64 {
    1
}

fn default_minutes_to_lock() -> i64 {
    10
}

fn default_minutes_until_refresh() -> i64 {
    60 * 24
}

fn default_crawler_name() -> String {
    "Relcrawl".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_contact_url() -> String {
    "https://example.com/relcrawl".to_string()
}

fn default_database_path() -> String {
    "./relcrawl.db".to_string()
}
