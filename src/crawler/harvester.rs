//! Crawl loop orchestrator
//!
//! The harvester owns the primary session, the worker pool, and the dedup
//! index. One pass scrolls the timeline, discovers item links, filters out
//! anything already fetched or in flight, and dispatches the remainder to the
//! pool. The loop never blocks on fetch completion: dispatch is fire-and-
//! manage, and finished jobs are reaped at the start of the next pass.

use crate::config::Config;
use crate::crawler::discovery::{item_id_from_url, Item};
use crate::crawler::fault::{classify, FaultKind};
use crate::crawler::phase::CrawlPhase;
use crate::driver::{SessionDriver, SessionFactory};
use crate::fetch::FetchContext;
use crate::index::SqliteIndex;
use crate::pool::{Job, WorkerPool};
use crate::session::SessionManager;
use crate::Result;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Drives the crawl loop over one target timeline
pub struct Harvester {
    config: Arc<Config>,
    factory: Arc<dyn SessionFactory>,
    primary: Arc<dyn SessionDriver>,
    pool: WorkerPool,
    ctx: Arc<FetchContext>,
    session_manager: SessionManager,
    phase: CrawlPhase,
}

impl Harvester {
    /// Provisions sessions, authenticates, and positions the primary session
    /// on the target timeline
    ///
    /// Startup order: output directories, index, one primary session plus the
    /// configured worker sessions, concurrent warm-up navigation, cookie
    /// establishment on the primary, propagation to the workers, and finally
    /// navigation to the timeline.
    pub async fn new(
        config: Arc<Config>,
        factory: Arc<dyn SessionFactory>,
        session_manager: SessionManager,
    ) -> Result<Self> {
        if config.sessions.kill_stray_browsers {
            let killed = factory.terminate_stray();
            if killed > 0 {
                tracing::info!("Terminated {} stray browser processes", killed);
            }
        }

        std::fs::create_dir_all(config.save_dir())?;
        std::fs::create_dir_all(Path::new(config.save_dir()).join("res"))?;

        let index = Arc::new(SqliteIndex::open(Path::new(&config.output.index_db_path))?);
        let ctx = Arc::new(FetchContext::new(
            index,
            Path::new(config.save_dir()).to_path_buf(),
        ));

        let primary = factory.open_session(true).await?;

        let mut workers: Vec<Arc<dyn SessionDriver>> = Vec::new();
        for _ in 0..config.sessions.worker_count {
            workers.push(factory.open_session(false).await?);
        }
        for _ in 0..config.sessions.extra_headless {
            workers.push(factory.open_session(true).await?);
        }
        tracing::info!(
            "Opened 1 primary and {} worker sessions",
            workers.len()
        );

        Self::warm_up(&config, &primary, &workers).await?;

        let cookies = session_manager.ensure_authenticated(&*primary).await?;
        session_manager.propagate(&cookies, &workers).await?;

        primary.navigate(&config.timeline_url()).await?;
        tracing::info!("Primary session on timeline {}", config.timeline_url());

        let pool = WorkerPool::new(
            workers,
            config.sessions.max_concurrent_fetches as usize,
            ctx.clone(),
        );

        Ok(Self {
            config,
            factory,
            primary,
            pool,
            ctx,
            session_manager,
            phase: CrawlPhase::Scrolling,
        })
    }

    /// Navigates every session to a neutral page so cookies can be installed
    ///
    /// Warm-up runs as its own task set, concurrently across all sessions; it
    /// is independent of the fetch pool and finishes before any fetch job can
    /// exist.
    async fn warm_up(
        config: &Config,
        primary: &Arc<dyn SessionDriver>,
        workers: &[Arc<dyn SessionDriver>],
    ) -> Result<()> {
        let url = config.warmup_url();
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for session in std::iter::once(primary).chain(workers.iter()) {
            let session = session.clone();
            let url = url.clone();
            tasks.spawn(async move {
                session.navigate(&url).await?;
                Ok(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined??;
        }
        tracing::debug!("Warmed up {} sessions at {}", workers.len() + 1, url);
        Ok(())
    }

    /// Executes one full pass of the crawl loop
    ///
    /// Returns the number of jobs dispatched this pass.
    pub async fn pass(&mut self) -> Result<usize> {
        // A fault can abandon the previous pass mid-cycle; every pass
        // re-enters at the top of the cycle.
        self.phase = CrawlPhase::Scrolling;
        self.primary
            .scroll_by(self.config.crawl.scroll_step_px)
            .await?;
        if self.config.crawl.render_pause_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.crawl.render_pause_ms)).await;
        }

        self.advance();
        let links = self.primary.item_links().await?;
        tracing::debug!("Discovered {} item links", links.len());

        self.advance();
        let jobs = self.filter(&links)?;

        self.advance();
        let mut dispatched = 0;
        for job in jobs {
            let id = job.item.id.clone();
            if self.pool.submit(job) {
                dispatched += 1;
            } else {
                tracing::debug!("Job for {} not accepted", id);
            }
        }
        if dispatched > 0 {
            tracing::info!("Dispatched {} new items", dispatched);
        }
        self.pool.check_and_work();

        self.advance();
        self.pool.reap_finished();
        self.session_manager.recover_login(&*self.primary).await?;
        // Let dispatched jobs make progress before the next pass.
        tokio::task::yield_now().await;

        Ok(dispatched)
    }

    /// Moves the loop to the next phase of the cycle
    fn advance(&mut self) {
        self.phase = self.phase.next();
        tracing::trace!("Crawl phase: {}", self.phase);
    }

    /// Filters discovered hrefs down to items worth fetching
    ///
    /// An item is skipped when its identifier was already seen earlier in the
    /// same link list, is queued or in flight in the pool, has an index
    /// record, or has an artifact on disk from a run that died before its
    /// record was written.
    fn filter(&self, links: &[String]) -> Result<Vec<Job>> {
        let mut seen_this_pass = HashSet::new();
        let mut jobs = Vec::new();

        for href in links {
            let Some(id) = item_id_from_url(href) else {
                tracing::debug!("Skipping unparseable href {}", href);
                continue;
            };

            if !seen_this_pass.insert(id.clone()) {
                continue;
            }
            if self.pool.is_tracked(&id) {
                continue;
            }
            if self.ctx.index().exists(&id)? {
                continue;
            }
            if self.ctx.artifact_exists(&id) {
                tracing::debug!("Artifact for {} already on disk, skipping fetch", id);
                continue;
            }

            jobs.push(Job::new(Item::new(id, href.clone())));
        }

        Ok(jobs)
    }

    /// Runs the crawl loop until a shutdown signal or a fatal fault
    ///
    /// Transient faults are logged and the loop continues; authentication
    /// faults leave the loop running degraded. Either way shutdown releases
    /// all sessions before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut outcome = Ok(());

        loop {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested");
                break;
            }

            tokio::select! {
                result = self.pass() => {
                    if let Err(e) = result {
                        match classify(&e) {
                            FaultKind::Transient => {
                                tracing::warn!("Transient fault, continuing: {}", e);
                            }
                            FaultKind::Auth => {
                                tracing::warn!(
                                    "Authentication could not be re-established, continuing degraded: {}",
                                    e
                                );
                            }
                            FaultKind::Fatal => {
                                tracing::error!("Fatal fault: {}", e);
                                outcome = Err(e);
                                break;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await;
        outcome
    }

    /// Releases the pool and every session (best-effort, idempotent)
    pub async fn shutdown(&mut self) {
        self.phase = CrawlPhase::ShuttingDown;

        self.pool.shutdown().await;
        if let Err(e) = self.primary.close().await {
            tracing::warn!("Failed to close primary session: {}", e);
        }

        if self.config.sessions.kill_stray_browsers {
            let killed = self.factory.terminate_stray();
            if killed > 0 {
                tracing::info!("Terminated {} stray browser processes", killed);
            }
        }

        tracing::info!("Harvester shut down");
    }

    /// Current crawl loop phase
    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Shared fetch context (index plus artifact directory)
    pub fn context(&self) -> &FetchContext {
        &self.ctx
    }

    /// The worker pool, for driving job completion externally
    pub fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("phase", &self.phase)
            .field("target", &self.config.target.user_handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CrawlConfig, DriverConfig, OutputConfig, SessionsConfig, TargetConfig,
    };
    use crate::driver::fake::{FakeFactory, FakeSession};
    use crate::index::IndexStore;
    use crate::session::SessionError;
    use crate::MagpieError;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Arc<Config> {
        Arc::new(Config {
            target: TargetConfig {
                user_handle: "somebody".to_string(),
                base_url: "https://example.com".to_string(),
            },
            sessions: SessionsConfig {
                worker_count: 2,
                extra_headless: 0,
                max_concurrent_fetches: 0,
                kill_stray_browsers: true,
                login_username: "somebody".to_string(),
            },
            crawl: CrawlConfig {
                scroll_step_px: 300,
                render_pause_ms: 0,
                auth_retry_limit: 3,
            },
            driver: DriverConfig {
                webdriver_url: "http://127.0.0.1:9515".to_string(),
            },
            output: OutputConfig {
                save_dir: dir.path().join("output").to_string_lossy().into_owned(),
                index_db_path: dir.path().join("index.db").to_string_lossy().into_owned(),
                cookie_path: dir.path().join("cookie.json").to_string_lossy().into_owned(),
            },
        })
    }

    fn manager(config: &Config) -> SessionManager {
        SessionManager::with_credentials(config, Some("s3cret".to_string())).with_pacing(0, 0)
    }

    /// Primary session with a logged-in cookie jar already present
    fn scripted_primary() -> Arc<FakeSession> {
        let primary = Arc::new(FakeSession::new());
        primary.preload_cookies(vec![crate::session::CookieRecord {
            name: "auth".to_string(),
            value: "tok".to_string(),
            domain: Some(".example.com".to_string()),
            expiry: Some(Utc::now().timestamp() + 24 * 3600),
        }]);
        primary
    }

    fn link(id: &str) -> String {
        format!("https://example.com/somebody/status/{}", id)
    }

    async fn drain_pool(harvester: &mut Harvester) {
        while !harvester.pool_mut().is_idle() {
            harvester.pool_mut().check_and_work();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn build(
        config: Arc<Config>,
        factory: Arc<FakeFactory>,
        primary: Arc<FakeSession>,
    ) -> Harvester {
        factory.script_session(primary);
        let mgr = manager(&config);
        Harvester::new(config, factory, mgr).await.unwrap()
    }

    #[tokio::test]
    async fn test_startup_warms_up_and_positions_primary() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();

        let harvester = build(config.clone(), factory.clone(), primary.clone()).await;

        // Primary plus two workers, all warmed up, primary on the timeline.
        let opened = factory.opened_sessions();
        assert_eq!(opened.len(), 3);
        for session in &opened {
            assert!(session
                .navigations()
                .contains(&"https://example.com/404".to_string()));
        }
        assert!(primary
            .navigations()
            .contains(&"https://example.com/somebody".to_string()));

        // Stray cleanup ran once at startup, output directories exist.
        assert_eq!(factory.stray_calls(), 1);
        assert!(dir.path().join("output/res").is_dir());
        assert_eq!(harvester.phase(), CrawlPhase::Scrolling);
    }

    #[tokio::test]
    async fn test_pass_dispatches_only_unseen_items() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        // 111 was fetched by an earlier run.
        let index = SqliteIndex::open(Path::new(&config.output.index_db_path)).unwrap();
        index.insert("111", Utc::now().timestamp(), None).unwrap();
        drop(index);

        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();
        primary.push_link_batch([link("111"), link("222"), link("222")]);

        let mut harvester = build(config, factory, primary).await;

        let dispatched = harvester.pass().await.unwrap();
        assert_eq!(dispatched, 1);
        assert_eq!(harvester.phase(), CrawlPhase::Idle);

        drain_pool(&mut harvester).await;
        assert!(harvester.context().index().exists("222").unwrap());
        assert!(harvester.context().artifact_exists("222"));
        assert!(!harvester.context().artifact_exists("111"));
    }

    #[tokio::test]
    async fn test_repeat_pass_dispatches_nothing_new() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();
        primary.push_link_batch([link("111")]);

        let mut harvester = build(config, factory, primary).await;

        assert_eq!(harvester.pass().await.unwrap(), 1);
        drain_pool(&mut harvester).await;

        // Same links remain in the DOM; the second pass finds nothing new.
        assert_eq!(harvester.pass().await.unwrap(), 0);
        assert_eq!(harvester.context().index().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_orphan_artifact_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        // A previous run wrote the artifact but died before the index record.
        std::fs::create_dir_all(config.save_dir()).unwrap();
        std::fs::write(config.artifact_path("333"), "orphan").unwrap();

        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();
        primary.push_link_batch([link("333")]);

        let mut harvester = build(config, factory, primary).await;

        assert_eq!(harvester.pass().await.unwrap(), 0);
        assert_eq!(harvester.context().index().count().unwrap(), 0);
        assert_eq!(
            std::fs::read_to_string(harvester.context().artifact_path("333")).unwrap(),
            "orphan"
        );
    }

    #[tokio::test]
    async fn test_pass_recovers_reappeared_login() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();

        let mut harvester = build(config, factory, primary.clone()).await;

        primary.set_login_visible(true);
        harvester.pass().await.unwrap();

        assert!(!primary.login_page_shown().await.unwrap());
        assert_eq!(primary.typed(crate::driver::LoginField::Password), "s3cret");
    }

    #[tokio::test]
    async fn test_exhausted_reauth_surfaces_auth_fault() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();

        let mut harvester = build(config, factory, primary.clone()).await;

        primary.set_login_visible(true);
        primary.set_login_sticky(true);

        let err = harvester.pass().await.unwrap_err();
        assert!(matches!(
            err,
            MagpieError::Session(SessionError::AuthExhausted { attempts: 3 })
        ));
        assert_eq!(classify(&err), FaultKind::Auth);
    }

    #[tokio::test]
    async fn test_pass_walks_the_cycle_and_reenters_after_fault() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();

        let mut harvester = build(config, factory, primary.clone()).await;
        assert_eq!(harvester.phase(), CrawlPhase::Scrolling);

        // A clean pass stops one transition short of wrapping around.
        harvester.pass().await.unwrap();
        assert_eq!(harvester.phase(), CrawlPhase::Idle);
        assert_eq!(harvester.phase().next(), CrawlPhase::Scrolling);

        // A re-auth fault abandons the pass at Idle; the next pass still
        // re-enters at the top and completes the cycle.
        primary.set_login_visible(true);
        primary.set_login_sticky(true);
        harvester.pass().await.unwrap_err();
        assert_eq!(harvester.phase(), CrawlPhase::Idle);

        primary.set_login_sticky(false);
        harvester.pass().await.unwrap();
        assert_eq!(harvester.phase(), CrawlPhase::Idle);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal_and_closes_sessions() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();

        let mut harvester = build(config, factory.clone(), primary.clone()).await;

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let result = harvester.run(rx).await;
            (harvester, result)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let (harvester, result) = handle.await.unwrap();
        result.unwrap();

        assert_eq!(harvester.phase(), CrawlPhase::ShuttingDown);
        assert!(primary.is_closed());
        for session in factory.opened_sessions() {
            assert!(session.is_closed());
        }
        // Stray cleanup ran at startup and again at shutdown.
        assert_eq!(factory.stray_calls(), 2);
    }
}
