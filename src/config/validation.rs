use crate::config::types::{Config, CrawlerConfig, StorageConfig, Timings, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_timings(&config.timings)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.parallel_fetches < 1 || config.parallel_fetches > 500 {
        return Err(ConfigError::Validation(format!(
            "parallel_fetches must be between 1 and 500, got {}",
            config.parallel_fetches
        )));
    }

    if config.max_jumps_away < 1 {
        return Err(ConfigError::Validation(
            "max_jumps_away must be >= 1".to_string(),
        ));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates lease and throttle windows
fn validate_timings(timings: &Timings) -> Result<(), ConfigError> {
    if timings.seconds_to_throttle < 5 {
        return Err(ConfigError::Validation(format!(
            "seconds_to_throttle must be >= 5, got {}",
            timings.seconds_to_throttle
        )));
    }

    if timings.max_exponential_pause < 1 || timings.max_exponential_pause > 16 {
        return Err(ConfigError::Validation(format!(
            "max_exponential_pause must be between 1 and 16, got {}",
            timings.max_exponential_pause
        )));
    }

    if timings.minutes_to_lock < 1 {
        return Err(ConfigError::Validation(format!(
            "minutes_to_lock must be >= 1, got {}",
            timings.minutes_to_lock
        )));
    }

    if timings.min_minutes_between_refresh < 0 {
        return Err(ConfigError::Validation(format!(
            "min_minutes_between_refresh cannot be negative, got {}",
            timings.min_minutes_between_refresh
        )));
    }

    // A fetched profile is re-locked for (min_between_refresh - lock); that
    // offset must not push the lease into the future past the refresh window.
    if timings.min_minutes_between_refresh > timings.minutes_to_lock {
        return Err(ConfigError::Validation(format!(
            "min_minutes_between_refresh ({}) cannot exceed minutes_to_lock ({})",
            timings.min_minutes_between_refresh, timings.minutes_to_lock
        )));
    }

    if timings.minutes_until_refresh < 1 {
        return Err(ConfigError::Validation(format!(
            "minutes_until_refresh must be >= 1, got {}",
            timings.minutes_until_refresh
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Also the robots.txt agent token, so keep it to alphanumerics and hyphens
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_parallel_fetches_bounds() {
        let mut config = Config::default();
        config.crawler.parallel_fetches = 0;
        assert!(validate(&config).is_err());

        config.crawler.parallel_fetches = 501;
        assert!(validate(&config).is_err());

        config.crawler.parallel_fetches = 1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_throttle_floor() {
        let mut config = Config::default();
        config.timings.seconds_to_throttle = 4;
        assert!(validate(&config).is_err());

        config.timings.seconds_to_throttle = 5;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_refresh_spacing_cannot_exceed_lock() {
        let mut config = Config::default();
        config.timings.minutes_to_lock = 5;
        config.timings.min_minutes_between_refresh = 6;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_crawler_name() {
        let mut config = Config::default();
        config.user_agent.crawler_name = "my-bot2".to_string();
        assert!(validate(&config).is_ok());

        config.user_agent.crawler_name = "my bot".to_string();
        assert!(validate(&config).is_err());

        config.user_agent.crawler_name = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_contact_url() {
        let mut config = Config::default();
        config.user_agent.contact_url = "not a url".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
