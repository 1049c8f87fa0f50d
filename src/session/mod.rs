//! Authentication state and session management

mod cookies;
mod manager;

pub use cookies::{
    any_near_expiry, load_cookies, log_validity, save_cookies, CookieRecord,
    RENEWAL_THRESHOLD_SECS,
};
pub use manager::{SessionManager, LOGIN_SECRET_VAR};

use crate::driver::DriverError;
use thiserror::Error;

/// Errors that can occur while managing sessions and authentication
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cookie store IO error: {0}")]
    CookieIo(#[from] std::io::Error),

    #[error("Malformed cookie store: {0}")]
    CookieFormat(#[from] serde_json::Error),

    #[error("Login secret is not available")]
    MissingSecret,

    #[error("Authentication failed after {attempts} attempts")]
    AuthExhausted { attempts: u32 },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
