use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

const ENV_PREFIX: &str = "RELCRAWL_";

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied after parsing and before validation,
/// so `RELCRAWL_PARALLEL=0` is rejected just like a bad file value.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    validate(&config)?;

    Ok(config)
}

/// Builds a configuration from defaults and the process environment only
pub fn load_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Applies `RELCRAWL_*` overrides read through `lookup`
///
/// | Variable | Field |
/// |----------|-------|
/// | `RELCRAWL_PARALLEL` | `crawler.parallel-fetches` |
/// | `RELCRAWL_MAX_JUMPS` | `crawler.max-jumps-away` |
/// | `RELCRAWL_PARSE_XFN` | `crawler.crawl-xfn` |
/// | `RELCRAWL_PARSE_FEEDS` | `crawler.crawl-feeds` |
/// | `RELCRAWL_SECONDS_TO_THROTTLE` | `timings.seconds-to-throttle` |
/// | `RELCRAWL_CACHE` | `cache.backend` |
/// | `RELCRAWL_DATABASE` | `storage.database-path` |
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        let key = format!("{}{}", ENV_PREFIX, name);
        lookup(&key).map(|value| (key, value))
    };

    if let Some((key, value)) = get("PARALLEL") {
        config.crawler.parallel_fetches = parse_number(&key, &value)?;
    }
    if let Some((key, value)) = get("MAX_JUMPS") {
        config.crawler.max_jumps_away = parse_number(&key, &value)?;
    }
    if let Some((_, value)) = get("PARSE_XFN") {
        config.crawler.crawl_xfn = is_truthy(&value);
    }
    if let Some((_, value)) = get("PARSE_FEEDS") {
        config.crawler.crawl_feeds = is_truthy(&value);
    }
    if let Some((key, value)) = get("SECONDS_TO_THROTTLE") {
        config.timings.seconds_to_throttle = parse_number(&key, &value)?;
    }
    if let Some((key, value)) = get("CACHE") {
        config.cache.backend = value
            .parse()
            .map_err(|_| ConfigError::Env { key, value })?;
    }
    if let Some((_, value)) = get("DATABASE") {
        config.storage.database_path = value;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Flags are on unless empty, `0` or `false`
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that two workers sharing a database can be checked
/// for running the same configuration.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheBackend;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
parallel-fetches = 10
max-jumps-away = 12
crawl-xfn = true

[timings]
seconds-to-throttle = 20
minutes-to-lock = 15

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"

[storage]
database-path = "./test.db"

[cache]
backend = "sqlite"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.parallel_fetches, 10);
        assert_eq!(config.crawler.max_jumps_away, 12);
        assert!(config.crawler.crawl_xfn);
        assert!(!config.crawler.crawl_feeds);
        assert_eq!(config.timings.seconds_to_throttle, 20);
        assert_eq!(config.timings.minutes_to_lock, 15);
        assert_eq!(config.timings.minutes_until_refresh, 60 * 24);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.parallel_fetches, 60);
        assert_eq!(config.crawler.max_jumps_away, 40);
        assert_eq!(config.timings.max_exponential_pause, 4);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
parallel-fetches = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("RELCRAWL_PARALLEL", "7"),
            ("RELCRAWL_MAX_JUMPS", "3"),
            ("RELCRAWL_PARSE_XFN", "1"),
            ("RELCRAWL_PARSE_FEEDS", "false"),
            ("RELCRAWL_SECONDS_TO_THROTTLE", "30"),
            ("RELCRAWL_CACHE", "sqlite"),
            ("RELCRAWL_DATABASE", "/tmp/other.db"),
        ]);
        let mut config = Config::default();
        config.crawler.crawl_feeds = true;

        apply_env_overrides(&mut config, |key| vars.get(key).cloned()).unwrap();

        assert_eq!(config.crawler.parallel_fetches, 7);
        assert_eq!(config.crawler.max_jumps_away, 3);
        assert!(config.crawler.crawl_xfn);
        assert!(!config.crawler.crawl_feeds);
        assert_eq!(config.timings.seconds_to_throttle, 30);
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.storage.database_path, "/tmp/other.db");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let vars = env(&[("RELCRAWL_PARALLEL", "many")]);
        let mut config = Config::default();

        let result = apply_env_overrides(&mut config, |key| vars.get(key).cloned());
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_truthy_flags() {
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("true"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("FALSE"));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
