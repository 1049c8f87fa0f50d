//! Scripted in-memory session drivers
//!
//! These doubles stand in for a real browser in the test suite: link batches
//! are revealed scroll by scroll, page text is served from a map, and login
//! form interactions are recorded for assertions.

use crate::driver::{DriverError, DriverResult, LoginField, SessionDriver, SessionFactory};
use crate::session::CookieRecord;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tracks how many fetches run at once across a set of fake sessions
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of fetches observed running concurrently
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A scripted browser session
#[derive(Default)]
pub struct FakeSession {
    pending_links: Mutex<VecDeque<Vec<String>>>,
    revealed: Mutex<Vec<String>>,
    login_visible: Mutex<bool>,
    typed: Mutex<HashMap<LoginField, String>>,
    page_texts: Mutex<HashMap<String, String>>,
    fail_once: Mutex<HashSet<String>>,
    cookies: Mutex<Vec<CookieRecord>>,
    navigations: Mutex<Vec<String>>,
    fetch_delay: Mutex<Duration>,
    gauge: Mutex<Option<Arc<ConcurrencyGauge>>>,
    login_sticky: AtomicBool,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a concurrency gauge and a per-fetch delay
    pub fn with_gauge(self, gauge: Arc<ConcurrencyGauge>, delay: Duration) -> Self {
        *self.gauge.lock().unwrap() = Some(gauge);
        *self.fetch_delay.lock().unwrap() = delay;
        self
    }

    /// Queues a batch of item links revealed by the next scroll pass
    pub fn push_link_batch<I, S>(&self, links: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_links
            .lock()
            .unwrap()
            .push_back(links.into_iter().map(Into::into).collect());
    }

    /// Shows or hides the login form
    pub fn set_login_visible(&self, visible: bool) {
        *self.login_visible.lock().unwrap() = visible;
    }

    /// When set, submitting the password no longer dismisses the login form
    pub fn set_login_sticky(&self, sticky: bool) {
        self.login_sticky.store(sticky, Ordering::SeqCst);
    }

    /// Serves `text` when `page_text` is called for `url`
    pub fn set_page_text(&self, url: &str, text: &str) {
        self.page_texts
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
    }

    /// Makes the next `page_text` call for `url` fail; later calls succeed
    pub fn fail_next_fetch(&self, url: &str) {
        self.fail_once.lock().unwrap().insert(url.to_string());
    }

    /// Preloads cookies so `cookies()` has something to return
    pub fn preload_cookies(&self, cookies: Vec<CookieRecord>) {
        *self.cookies.lock().unwrap() = cookies;
    }

    /// Everything typed into the given login field so far
    pub fn typed(&self, field: LoginField) -> String {
        self.typed
            .lock()
            .unwrap()
            .get(&field)
            .cloned()
            .unwrap_or_default()
    }

    /// URLs this session navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDriver for FakeSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn scroll_by(&self, _pixels: u32) -> DriverResult<()> {
        if let Some(batch) = self.pending_links.lock().unwrap().pop_front() {
            self.revealed.lock().unwrap().extend(batch);
        }
        Ok(())
    }

    async fn item_links(&self) -> DriverResult<Vec<String>> {
        Ok(self.revealed.lock().unwrap().clone())
    }

    async fn login_page_shown(&self) -> DriverResult<bool> {
        Ok(*self.login_visible.lock().unwrap())
    }

    async fn click_login_link(&self) -> DriverResult<()> {
        self.set_login_visible(true);
        Ok(())
    }

    async fn focus_field(&self, field: LoginField) -> DriverResult<()> {
        if !*self.login_visible.lock().unwrap() {
            return Err(DriverError::ElementNotFound(format!("{:?}", field)));
        }
        Ok(())
    }

    async fn type_char(&self, field: LoginField, ch: char) -> DriverResult<()> {
        self.typed.lock().unwrap().entry(field).or_default().push(ch);
        Ok(())
    }

    async fn press_enter(&self, field: LoginField) -> DriverResult<()> {
        // Submitting the password completes the login flow.
        if field == LoginField::Password && !self.login_sticky.load(Ordering::SeqCst) {
            self.set_login_visible(false);
        }
        Ok(())
    }

    async fn page_text(&self, url: &str) -> DriverResult<String> {
        if self.fail_once.lock().unwrap().remove(url) {
            return Err(DriverError::Script(format!("scripted failure for {}", url)));
        }

        let gauge = self.gauge.lock().unwrap().clone();
        let delay = *self.fetch_delay.lock().unwrap();

        if let Some(gauge) = &gauge {
            gauge.enter();
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(gauge) = &gauge {
            gauge.exit();
        }

        self.navigations.lock().unwrap().push(url.to_string());
        let text = self
            .page_texts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| format!("content of {}", url));
        Ok(text)
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> DriverResult<()> {
        *self.cookies.lock().unwrap() = cookies.to_vec();
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieRecord>> {
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out fake sessions, optionally pre-scripted ones first
#[derive(Default)]
pub struct FakeFactory {
    scripted: Mutex<VecDeque<Arc<FakeSession>>>,
    opened: Mutex<Vec<Arc<FakeSession>>>,
    stray_calls: AtomicUsize,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a session to be handed out by the next `open_session` call
    pub fn script_session(&self, session: Arc<FakeSession>) {
        self.scripted.lock().unwrap().push_back(session);
    }

    /// All sessions opened so far, in order
    pub fn opened_sessions(&self) -> Vec<Arc<FakeSession>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn stray_calls(&self) -> usize {
        self.stray_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open_session(&self, _headless: bool) -> DriverResult<Arc<dyn SessionDriver>> {
        let session = self
            .scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Arc::new(FakeSession::new()));
        self.opened.lock().unwrap().push(session.clone());
        Ok(session)
    }

    fn terminate_stray(&self) -> usize {
        self.stray_calls.fetch_add(1, Ordering::SeqCst);
        0
    }
}
