//! Configuration module for relcrawl
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and applying `RELCRAWL_*` environment overrides on top.
//!
//! # Example
//!
//! ```no_run
//! use relcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("relcrawl.toml")).unwrap();
//! println!("Parallel fetches: {}", config.crawler.parallel_fetches);
//! ```

mod parser;
mod types;
pub mod validation;

// Re-export types
pub use types::{
    CacheBackend, CacheConfig, Config, CrawlerConfig, StorageConfig, Timings, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash,
    load_from_env,
};
pub use validation::validate;
