//! Session manager
//!
//! Owns authentication for the primary session and propagates its cookie set
//! to every worker session. Credential entry simulates human-paced typing to
//! avoid the most obvious automation fingerprint.

use crate::config::Config;
use crate::driver::{LoginField, SessionDriver};
use crate::session::cookies::{any_near_expiry, load_cookies, log_validity, save_cookies};
use crate::session::{CookieRecord, SessionError};
use chrono::Utc;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable supplying the login secret
pub const LOGIN_SECRET_VAR: &str = "LOGIN_SECRET";

/// Manages authentication state across the primary and worker sessions
pub struct SessionManager {
    login_username: String,
    login_secret: Option<String>,
    cookie_path: PathBuf,
    auth_retry_limit: u32,
    pacing_ms: (u64, u64),
}

impl SessionManager {
    /// Creates a session manager, reading the login secret from the
    /// environment
    ///
    /// A missing secret is logged but does not abort startup; credential
    /// entry will fail later if it turns out to be needed.
    pub fn new(config: &Config) -> Self {
        let secret = std::env::var(LOGIN_SECRET_VAR).ok();
        if secret.is_none() {
            tracing::warn!(
                "Environment variable {} is not set; login will fail if credentials are needed",
                LOGIN_SECRET_VAR
            );
        }
        Self::with_credentials(config, secret)
    }

    /// Creates a session manager with an explicit secret
    pub fn with_credentials(config: &Config, login_secret: Option<String>) -> Self {
        Self {
            login_username: config.sessions.login_username.clone(),
            login_secret,
            cookie_path: PathBuf::from(&config.output.cookie_path),
            auth_retry_limit: config.crawl.auth_retry_limit,
            pacing_ms: (100, 300),
        }
    }

    /// Overrides the inter-keystroke pacing bounds (milliseconds)
    pub fn with_pacing(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.pacing_ms = (min_ms, max_ms.max(min_ms));
        self
    }

    /// Establishes authentication on the primary session
    ///
    /// Reuses the persisted cookie set when present and not near expiry;
    /// otherwise runs credential entry against the login form and persists
    /// the fresh cookies. Returns the cookie set now installed on the
    /// primary session.
    pub async fn ensure_authenticated(
        &self,
        primary: &dyn SessionDriver,
    ) -> Result<Vec<CookieRecord>, SessionError> {
        if !self.cookie_path.exists() {
            tracing::info!("No persisted cookies, performing credential entry");
            self.enter_credentials(primary, true).await?;
            let cookies = primary.cookies().await?;
            save_cookies(&self.cookie_path, &cookies)?;
            return Ok(cookies);
        }

        let persisted = load_cookies(&self.cookie_path)?;
        log_validity(&persisted);

        let now = Utc::now().timestamp();
        if any_near_expiry(&persisted, now) {
            tracing::info!("Persisted cookies expired or near expiry, re-authenticating");
            self.enter_credentials(primary, true).await?;
            let cookies = primary.cookies().await?;
            save_cookies(&self.cookie_path, &cookies)?;
            return Ok(cookies);
        }

        tracing::info!("Reusing {} persisted cookies", persisted.len());
        primary.set_cookies(&persisted).await?;
        Ok(persisted)
    }

    /// Copies the cookie set into every worker session
    pub async fn propagate(
        &self,
        cookies: &[CookieRecord],
        sessions: &[Arc<dyn SessionDriver>],
    ) -> Result<(), SessionError> {
        for session in sessions {
            session.set_cookies(cookies).await?;
        }
        tracing::debug!(
            "Propagated {} cookies to {} worker sessions",
            cookies.len(),
            sessions.len()
        );
        Ok(())
    }

    /// Re-authenticates a session on which the login page has reappeared
    ///
    /// Returns `Ok(true)` once the login page is gone (including when it was
    /// never shown). Exhausting the retry limit is an error; the caller
    /// decides whether to continue in a degraded state.
    pub async fn recover_login(&self, session: &dyn SessionDriver) -> Result<bool, SessionError> {
        if !session.login_page_shown().await? {
            return Ok(true);
        }

        for attempt in 1..=self.auth_retry_limit {
            tracing::warn!(
                "Login page reappeared, re-authenticating (attempt {}/{})",
                attempt,
                self.auth_retry_limit
            );

            if let Err(e) = self.enter_credentials(session, false).await {
                tracing::warn!("Credential entry failed: {}", e);
            }

            if !session.login_page_shown().await? {
                tracing::info!("Re-authentication succeeded");
                return Ok(true);
            }
        }

        Err(SessionError::AuthExhausted {
            attempts: self.auth_retry_limit,
        })
    }

    /// Runs credential entry against the login form
    ///
    /// `click_login` clicks the login link first (first-time login); re-auth
    /// after a redirect lands directly on the form and skips the click.
    async fn enter_credentials(
        &self,
        session: &dyn SessionDriver,
        click_login: bool,
    ) -> Result<(), SessionError> {
        let secret = self
            .login_secret
            .clone()
            .ok_or(SessionError::MissingSecret)?;

        if click_login {
            session.click_login_link().await?;
        }

        session.focus_field(LoginField::Username).await?;
        tracing::debug!("Typing username");
        self.human_type(session, LoginField::Username, &self.login_username)
            .await?;
        session.press_enter(LoginField::Username).await?;

        session.focus_field(LoginField::Password).await?;
        tracing::debug!("Typing password");
        self.human_type(session, LoginField::Password, &secret).await?;
        session.press_enter(LoginField::Password).await?;

        Ok(())
    }

    /// Types text one character at a time with randomized pacing
    async fn human_type(
        &self,
        session: &dyn SessionDriver,
        field: LoginField,
        text: &str,
    ) -> Result<(), SessionError> {
        for ch in text.chars() {
            session.type_char(field, ch).await?;
            let millis = {
                let mut rng = rand::thread_rng();
                rng.gen_range(self.pacing_ms.0..=self.pacing_ms.1)
            };
            if millis > 0 {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
        }
        Ok(())
    }
}
