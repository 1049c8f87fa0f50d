//! Full-loop harvest tests
//!
//! A scripted primary session reveals timeline links batch by batch as the
//! loop scrolls; the tests assert that every revealed item ends up fetched
//! exactly once, that restarts resume from the index, and that shutdown
//! releases every session.

use chrono::Utc;
use magpie_harvest::config::{
    Config, CrawlConfig, DriverConfig, OutputConfig, SessionsConfig, TargetConfig,
};
use magpie_harvest::crawler::{CrawlPhase, Harvester};
use magpie_harvest::driver::fake::{FakeFactory, FakeSession};
use magpie_harvest::session::{CookieRecord, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

fn test_config(dir: &TempDir, worker_count: u32) -> Arc<Config> {
    Arc::new(Config {
        target: TargetConfig {
            user_handle: "somebody".to_string(),
            base_url: "https://example.com".to_string(),
        },
        sessions: SessionsConfig {
            worker_count,
            extra_headless: 0,
            max_concurrent_fetches: 0,
            kill_stray_browsers: false,
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

/// Primary session that already holds a valid login cookie
fn scripted_primary() -> Arc<FakeSession> {
    let primary = Arc::new(FakeSession::new());
    primary.preload_cookies(vec![CookieRecord {
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

async fn start_harvester(
    config: Arc<Config>,
    factory: Arc<FakeFactory>,
    primary: Arc<FakeSession>,
) -> Harvester {
    factory.script_session(primary);
    let mgr = SessionManager::with_credentials(&config, Some("s3cret".to_string()))
        .with_pacing(0, 0);
    Harvester::new(config, factory, mgr)
        .await
        .expect("failed to start harvester")
}

#[tokio::test]
async fn test_full_harvest_fetches_each_item_once() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 2);
    let factory = Arc::new(FakeFactory::new());
    let primary = scripted_primary();

    // Two scroll passes reveal four items; "222" appears in both batches.
    primary.push_link_batch([link("111"), link("222")]);
    primary.push_link_batch([link("222"), link("333"), link("444")]);
    primary.set_page_text(&link("111"), "first post");

    let mut harvester = start_harvester(config, factory.clone(), primary).await;

    // Two passes discover everything; then drain the pool.
    harvester.pass().await.unwrap();
    harvester.pass().await.unwrap();
    while !harvester.pool_mut().is_idle() {
        harvester.pool_mut().check_and_work();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let index = harvester.context().index();
    assert_eq!(index.count().unwrap(), 4);
    for id in ["111", "222", "333", "444"] {
        assert!(index.exists(id).unwrap(), "missing index record for {}", id);
        assert!(
            harvester.context().artifact_exists(id),
            "missing artifact for {}",
            id
        );
    }
    assert_eq!(
        std::fs::read_to_string(harvester.context().artifact_path("111")).unwrap(),
        "first post"
    );

    harvester.shutdown().await;
}

#[tokio::test]
async fn test_restart_resumes_from_index() {
    let dir = TempDir::new().unwrap();

    // First run fetches two items, then shuts down.
    {
        let config = test_config(&dir, 1);
        let factory = Arc::new(FakeFactory::new());
        let primary = scripted_primary();
        primary.push_link_batch([link("111"), link("222")]);

        let mut harvester = start_harvester(config, factory, primary).await;
        harvester.pass().await.unwrap();
        while !harvester.pool_mut().is_idle() {
            harvester.pool_mut().check_and_work();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(harvester.context().index().count().unwrap(), 2);
        harvester.shutdown().await;
    }

    // Second run sees the same timeline plus one new item; only the new
    // item is fetched.
    let config = test_config(&dir, 1);
    let factory = Arc::new(FakeFactory::new());
    let primary = scripted_primary();
    primary.push_link_batch([link("111"), link("222"), link("333")]);

    let mut harvester = start_harvester(config, factory, primary).await;
    let dispatched = harvester.pass().await.unwrap();
    assert_eq!(dispatched, 1);

    while !harvester.pool_mut().is_idle() {
        harvester.pool_mut().check_and_work();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(harvester.context().index().count().unwrap(), 3);
    assert!(harvester.context().index().exists("333").unwrap());

    harvester.shutdown().await;
}

#[tokio::test]
async fn test_run_loop_harvests_and_shuts_down_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 2);
    let factory = Arc::new(FakeFactory::new());
    let primary = scripted_primary();
    primary.push_link_batch([link("111"), link("222"), link("333")]);

    let artifact_dir = dir.path().join("output");
    let harvester = start_harvester(config, factory.clone(), primary.clone()).await;

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut harvester = harvester;
        let result = harvester.run(rx).await;
        (harvester, result)
    });

    // Wait until all three artifacts exist, then signal shutdown.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let done = ["111", "222", "333"]
            .iter()
            .all(|id| artifact_dir.join(format!("{}.md", id)).exists());
        if done {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for artifacts"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();

    let (harvester, result) = handle.await.unwrap();
    result.unwrap();

    assert_eq!(harvester.phase(), CrawlPhase::ShuttingDown);
    assert!(primary.is_closed());
    for session in factory.opened_sessions() {
        assert!(session.is_closed());
    }
}

#[tokio::test]
async fn test_failed_item_is_retried_on_a_later_pass() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, 1);
    let factory = Arc::new(FakeFactory::new());
    let primary = scripted_primary();
    primary.push_link_batch([link("555")]);

    let mut harvester = start_harvester(config, factory.clone(), primary).await;

    // The single worker fails its first fetch of 555.
    let worker = &factory.opened_sessions()[1];
    worker.fail_next_fetch(&link("555"));

    harvester.pass().await.unwrap();
    while !harvester.pool_mut().is_idle() {
        harvester.pool_mut().check_and_work();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!harvester.context().index().exists("555").unwrap());

    // The link is still in the DOM; the next pass re-dispatches it.
    let dispatched = harvester.pass().await.unwrap();
    assert_eq!(dispatched, 1);
    while !harvester.pool_mut().is_idle() {
        harvester.pool_mut().check_and_work();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(harvester.context().index().exists("555").unwrap());
    assert!(harvester.context().artifact_exists("555"));

    harvester.shutdown().await;
}
