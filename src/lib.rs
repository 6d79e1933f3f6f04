//! Relcrawl: an identity-graph crawler
//!
//! This crate crawls pages for `rel="me"`, canonical, and optionally XFN
//! `contact` and feed `alternate` relations, stores them as a graph of
//! profiles, and answers "which URLs belong to the same identity" once the
//! cluster around a page has been fully crawled.

pub mod cache;
pub mod config;
pub mod context;
pub mod crawler;
pub mod graph;
pub mod output;
pub mod profile;
pub mod robots;
pub mod spider;
pub mod state;
pub mod storage;
pub mod url;
pub mod webhook;

use thiserror::Error;

/// Main error type for relcrawl operations
#[derive(Debug, Error)]
pub enum RelcrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Unexpected HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Redirect from {url} has no usable Location header")]
    RedirectWithoutLocation { url: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Graph error: {0}")]
    Graph(#[from] graph::GraphError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to check crawlability of {url}: {message}")]
    Robots { url: String, message: String },

    #[error("No graph node for profile {0}")]
    MissingNode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelcrawlError {
    /// Returns true for errors caused by caller input rather than a fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::UrlParse(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for environment variable {key}: {value}")]
    Env { key: String, value: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Not a web URL: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),

    #[error("Hostname is too long: {0}")]
    HostTooLong(String),

    #[error("URL is too long ({0} characters)")]
    TooLong(usize),
}

/// Result type alias for relcrawl operations
pub type Result<T> = std::result::Result<T, RelcrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use context::CrawlContext;
pub use graph::{EdgeKind, GraphNode};
pub use profile::Profile;
pub use spider::{Lookup, Related, Spider};
pub use state::ProfileState;
pub use url::{extract_host, validate_url};
