//! Configuration validation
//!
//! Sanity checks applied after parsing, before any session is opened.

use crate::config::types::Config;
use crate::ConfigError;

/// Validates a parsed configuration
///
/// # Errors
///
/// Returns `ConfigError::Validation` describing the first problem found.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.target.user_handle.trim().is_empty() {
        return Err(ConfigError::Validation(
            "target.user-handle must not be empty".to_string(),
        ));
    }

    if config.target.base_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "target.base-url must not be empty".to_string(),
        ));
    }

    if config.sessions.worker_count == 0 {
        return Err(ConfigError::Validation(
            "sessions.worker-count must be at least 1".to_string(),
        ));
    }

    if config.sessions.login_username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "sessions.login-username must not be empty".to_string(),
        ));
    }

    if config.crawl.scroll_step_px == 0 {
        return Err(ConfigError::Validation(
            "crawl.scroll-step-px must be at least 1".to_string(),
        ));
    }

    if config.crawl.auth_retry_limit == 0 {
        return Err(ConfigError::Validation(
            "crawl.auth-retry-limit must be at least 1".to_string(),
        ));
    }

    if config.driver.webdriver_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "driver.webdriver-url must not be empty".to_string(),
        ));
    }

    if config.output.save_dir.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.save-dir must not be empty".to_string(),
        ));
    }

    if config.output.index_db_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.index-db-path must not be empty".to_string(),
        ));
    }

    if config.output.cookie_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output.cookie-path must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn valid_config() -> Config {
        Config {
            target: TargetConfig {
                user_handle: "somebody".to_string(),
                base_url: "https://twitter.com".to_string(),
            },
            sessions: SessionsConfig {
                worker_count: 2,
                extra_headless: 0,
                max_concurrent_fetches: 0,
                kill_stray_browsers: false,
                login_username: "somebody".to_string(),
            },
            crawl: CrawlConfig::default(),
            driver: DriverConfig {
                webdriver_url: "http://127.0.0.1:9515".to_string(),
            },
            output: OutputConfig {
                save_dir: "./output".to_string(),
                index_db_path: "./index.db".to_string(),
                cookie_path: "./cookie.json".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_handle_rejected() {
        let mut config = valid_config();
        config.target.user_handle = "  ".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.sessions.worker_count = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_auth_retry_rejected() {
        let mut config = valid_config();
        config.crawl.auth_retry_limit = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_save_dir_rejected() {
        let mut config = valid_config();
        config.output.save_dir = String::new();
        assert!(validate(&config).is_err());
    }
}
