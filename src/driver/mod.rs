//! Browser driver seam
//!
//! The underlying browser-automation primitives (navigation, element lookup,
//! script execution) live behind the [`SessionDriver`] and [`SessionFactory`]
//! traits. The rest of the crate only ever talks to these traits; the
//! WebDriver-backed production implementation is in [`webdriver`], and the
//! test suite substitutes scripted in-memory drivers from [`fake`].

pub mod fake;
mod webdriver;

pub use webdriver::{WebDriverFactory, WebDriverSession};

use crate::session::CookieRecord;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a browser driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session closed")]
    SessionClosed,
}

/// Result type for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Inputs on the login form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginField {
    Username,
    Password,
}

/// One browser-driven context: a logged-in (or logging-in) client instance
///
/// All methods block the calling task for the duration of the underlying
/// browser call. Implementations must be safe to share across tasks; each
/// session executes at most one fetch at a time by construction of the
/// worker pool.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Navigates the session to `url`
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Scrolls the current page down by `pixels`
    async fn scroll_by(&self, pixels: u32) -> DriverResult<()>;

    /// Returns the hrefs of all item links currently present in the DOM
    async fn item_links(&self) -> DriverResult<Vec<String>>;

    /// Returns true when the login form is currently on screen
    async fn login_page_shown(&self) -> DriverResult<bool>;

    /// Clicks the login link on a logged-out landing page
    async fn click_login_link(&self) -> DriverResult<()>;

    /// Waits for the given login input to appear and focuses it
    async fn focus_field(&self, field: LoginField) -> DriverResult<()>;

    /// Types a single character into a previously focused login input
    async fn type_char(&self, field: LoginField, ch: char) -> DriverResult<()>;

    /// Sends Enter to a previously focused login input
    async fn press_enter(&self, field: LoginField) -> DriverResult<()>;

    /// Navigates to an item page and returns its rendered text content
    async fn page_text(&self, url: &str) -> DriverResult<String>;

    /// Installs cookies into this session
    async fn set_cookies(&self, cookies: &[CookieRecord]) -> DriverResult<()>;

    /// Reads the session's current cookies
    async fn cookies(&self) -> DriverResult<Vec<CookieRecord>>;

    /// Releases the session's browser resources
    async fn close(&self) -> DriverResult<()>;
}

/// Opens browser sessions and cleans up after them
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a new browser session
    async fn open_session(&self, headless: bool) -> DriverResult<Arc<dyn SessionDriver>>;

    /// Best-effort termination of stray browser processes
    ///
    /// Returns the number of processes terminated. The default implementation
    /// does nothing; process-level cleanup belongs to the environment hosting
    /// the driver.
    fn terminate_stray(&self) -> usize {
        0
    }
}
