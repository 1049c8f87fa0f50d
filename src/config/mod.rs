//! Configuration loading and validation
//!
//! The configuration is a declarative TOML file constructed once at startup
//! and passed by reference into every component constructor. There is no
//! process-wide mutable configuration state.

mod parser;
mod types;
mod validation;

pub use parser::load_config;
pub use types::{
    Config, CrawlConfig, DriverConfig, OutputConfig, SessionsConfig, TargetConfig,
};
pub use validation::validate;
