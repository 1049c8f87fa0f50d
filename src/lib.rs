//! Magpie-Harvest: a timeline harvester
//!
//! This crate continuously harvests posts from a single user's timeline by
//! driving a pool of authenticated browser sessions, deduplicating
//! already-seen items against a durable index, and persisting each item's
//! content to disk.

pub mod config;
pub mod crawler;
pub mod driver;
pub mod fetch;
pub mod index;
pub mod pool;
pub mod session;

use thiserror::Error;

/// Main error type for Magpie-Harvest operations
#[derive(Debug, Error)]
pub enum MagpieError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("Session error: {0}")]
    Session(#[from] session::SessionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
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
}

/// Result type alias for Magpie-Harvest operations
pub type Result<T> = std::result::Result<T, MagpieError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlPhase, Harvester};
pub use session::CookieRecord;
