use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Magpie-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    pub driver: DriverConfig,
    pub output: OutputConfig,
}

/// Which timeline to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Handle of the user whose timeline is harvested
    #[serde(rename = "user-handle")]
    pub user_handle: String,

    /// Base URL of the site
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://twitter.com".to_string()
}

/// Browser session provisioning and login configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Number of worker sessions executing fetch jobs
    #[serde(rename = "worker-count")]
    pub worker_count: u32,

    /// Additional headless worker sessions on top of `worker-count`
    #[serde(rename = "extra-headless", default)]
    pub extra_headless: u32,

    /// Cap on concurrently executing fetch jobs (0 = one per session)
    #[serde(rename = "max-concurrent-fetches", default)]
    pub max_concurrent_fetches: u32,

    /// Terminate stray browser processes on start and stop
    #[serde(rename = "kill-stray-browsers", default)]
    pub kill_stray_browsers: bool,

    /// Username typed into the login form
    #[serde(rename = "login-username")]
    pub login_username: String,
}

/// Crawl loop pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Scroll increment per pass, in pixels
    #[serde(rename = "scroll-step-px", default = "default_scroll_step")]
    pub scroll_step_px: u32,

    /// Pause after each scroll so lazy-loaded content can render (milliseconds)
    #[serde(rename = "render-pause-ms", default = "default_render_pause")]
    pub render_pause_ms: u64,

    /// Re-login attempts before a session is considered degraded
    #[serde(rename = "auth-retry-limit", default = "default_auth_retry_limit")]
    pub auth_retry_limit: u32,
}

fn default_scroll_step() -> u32 {
    300
}

fn default_render_pause() -> u64 {
    1000
}

fn default_auth_retry_limit() -> u32 {
    3
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            scroll_step_px: default_scroll_step(),
            render_pause_ms: default_render_pause(),
            auth_retry_limit: default_auth_retry_limit(),
        }
    }
}

/// WebDriver endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Base URL of the WebDriver server (e.g. a local chromedriver)
    #[serde(rename = "webdriver-url")]
    pub webdriver_url: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory where item artifacts are written
    #[serde(rename = "save-dir")]
    pub save_dir: String,

    /// Path to the SQLite dedup index database
    #[serde(rename = "index-db-path")]
    pub index_db_path: String,

    /// Path to the persisted cookie store (JSON array)
    #[serde(rename = "cookie-path")]
    pub cookie_path: String,
}

impl Config {
    /// Total number of worker sessions, headed plus extra headless
    pub fn total_worker_sessions(&self) -> usize {
        (self.sessions.worker_count + self.sessions.extra_headless) as usize
    }

    /// Effective fetch concurrency: never more than one job per session
    pub fn fetch_capacity(&self) -> usize {
        let sessions = self.total_worker_sessions();
        match self.sessions.max_concurrent_fetches as usize {
            0 => sessions,
            n => n.min(sessions),
        }
    }

    /// URL of the target user's timeline
    pub fn timeline_url(&self) -> String {
        format!(
            "{}/{}",
            self.target.base_url.trim_end_matches('/'),
            self.target.user_handle
        )
    }

    /// Neutral page used for session warm-up before cookies are installed
    pub fn warmup_url(&self) -> String {
        format!("{}/404", self.target.base_url.trim_end_matches('/'))
    }

    /// Path of the on-disk artifact for an item identifier
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        PathBuf::from(&self.save_dir()).join(format!("{}.md", id))
    }

    /// The artifact directory
    pub fn save_dir(&self) -> &str {
        &self.output.save_dir
    }
}
