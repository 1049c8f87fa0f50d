//! Cookie records and the persisted cookie store
//!
//! Authentication state is a set of cookie records persisted as a JSON array
//! file, read at startup and rewritten after any (re-)authentication.

use crate::session::SessionError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cookies whose expiry is closer than this are treated as near-expiry and
/// trigger re-authentication (2 hours).
pub const RENEWAL_THRESHOLD_SECS: i64 = 2 * 60 * 60;

/// One authentication cookie
///
/// Extra fields in driver cookie payloads (httpOnly, path, ...) are ignored
/// on deserialization; only what the renewal logic needs is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Expiry in epoch seconds; session cookies have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl CookieRecord {
    /// True when the cookie is expired or expires within the renewal threshold
    pub fn is_near_expiry(&self, now: i64) -> bool {
        match self.expiry {
            Some(expiry) => expiry - now < RENEWAL_THRESHOLD_SECS,
            None => false,
        }
    }
}

/// True when any record in the set is expired or near expiry
pub fn any_near_expiry(cookies: &[CookieRecord], now: i64) -> bool {
    cookies.iter().any(|c| c.is_near_expiry(now))
}

/// Loads the persisted cookie set from `path`
pub fn load_cookies(path: &Path) -> Result<Vec<CookieRecord>, SessionError> {
    let content = std::fs::read_to_string(path)?;
    let cookies = serde_json::from_str(&content)?;
    Ok(cookies)
}

/// Writes the cookie set to `path`, creating parent directories as needed
pub fn save_cookies(path: &Path, cookies: &[CookieRecord]) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, json)?;
    tracing::info!("Saved {} cookies to {}", cookies.len(), path.display());
    Ok(())
}

/// Logs the remaining validity of each cookie in the set
pub fn log_validity(cookies: &[CookieRecord]) {
    let now = Utc::now().timestamp();
    for cookie in cookies {
        match cookie.expiry {
            None => tracing::debug!("Cookie {} has no expiry", cookie.name),
            Some(expiry) if expiry <= now => {
                tracing::warn!("Cookie {} has expired", cookie.name);
            }
            Some(expiry) => {
                let remaining = expiry - now;
                let hours = remaining / 3600;
                let minutes = (remaining % 3600) / 60;
                tracing::info!(
                    "Cookie {} is valid for {}h{:02}m",
                    cookie.name,
                    hours,
                    minutes
                );
            }
        }
    }
}
