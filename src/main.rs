//! Magpie-Harvest main entry point
//!
//! This is the command-line interface for the Magpie-Harvest timeline
//! harvester.

use anyhow::Context;
use clap::Parser;
use magpie_harvest::config::load_config;
use magpie_harvest::crawler::Harvester;
use magpie_harvest::driver::WebDriverFactory;
use magpie_harvest::session::SessionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Magpie-Harvest: a timeline harvester
///
/// Magpie-Harvest continuously scrolls one user's timeline with a pool of
/// authenticated browser sessions, saves each post it has not seen before,
/// and records it in a durable dedup index so interrupted runs pick up
/// where they left off.
#[derive(Parser, Debug)]
#[command(name = "magpie")]
#[command(version = "0.4.0")]
#[command(about = "A timeline harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be harvested without starting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the index and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config).await;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("magpie_harvest=info,warn"),
            1 => EnvFilter::new("magpie_harvest=debug,info"),
            2 => EnvFilter::new("magpie_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the effective setup
fn handle_dry_run(config: &magpie_harvest::config::Config) -> anyhow::Result<()> {
    println!("=== Magpie-Harvest Dry Run ===\n");

    println!("Target:");
    println!("  User handle: {}", config.target.user_handle);
    println!("  Timeline URL: {}", config.timeline_url());

    println!("\nSessions:");
    println!("  Worker sessions: {}", config.sessions.worker_count);
    println!("  Extra headless: {}", config.sessions.extra_headless);
    println!("  Fetch concurrency: {}", config.fetch_capacity());
    println!("  Login username: {}", config.sessions.login_username);
    println!(
        "  Kill stray browsers: {}",
        config.sessions.kill_stray_browsers
    );

    println!("\nCrawl pacing:");
    println!("  Scroll step: {}px", config.crawl.scroll_step_px);
    println!("  Render pause: {}ms", config.crawl.render_pause_ms);
    println!("  Auth retry limit: {}", config.crawl.auth_retry_limit);

    println!("\nDriver:");
    println!("  WebDriver URL: {}", config.driver.webdriver_url);

    println!("\nOutput:");
    println!("  Artifacts: {}", config.output.save_dir);
    println!("  Index: {}", config.output.index_db_path);
    println!("  Cookies: {}", config.output.cookie_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest {} with {} worker sessions",
        config.timeline_url(),
        config.total_worker_sessions()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the index
fn handle_stats(config: &magpie_harvest::config::Config) -> anyhow::Result<()> {
    use magpie_harvest::index::{IndexStore, SqliteIndex};
    use std::path::Path;

    println!("Index: {}\n", config.output.index_db_path);

    let index = SqliteIndex::open(Path::new(&config.output.index_db_path))
        .with_context(|| format!("failed to open index at {}", config.output.index_db_path))?;
    println!("Indexed items: {}", index.count()?);

    let artifacts = match std::fs::read_dir(config.save_dir()) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "md"))
            .count(),
        Err(_) => 0,
    };
    println!("Artifacts on disk: {}", artifacts);

    Ok(())
}

/// Handles the main harvest operation
///
/// Runs until interrupted; Ctrl-C triggers an orderly shutdown. Failures are
/// logged but the process still exits cleanly once sessions are released.
async fn handle_harvest(config: magpie_harvest::config::Config) {
    let config = Arc::new(config);

    tracing::info!(
        "Harvesting {} with {} worker sessions",
        config.timeline_url(),
        config.total_worker_sessions()
    );

    let session_manager = SessionManager::new(&config);
    let factory = Arc::new(WebDriverFactory::new(&config.driver.webdriver_url));

    let mut harvester = match Harvester::new(config, factory, session_manager).await {
        Ok(harvester) => harvester,
        Err(e) => {
            tracing::error!("Failed to start harvester: {}", e);
            return;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    match harvester.run(shutdown_rx).await {
        Ok(()) => tracing::info!("Harvest stopped cleanly"),
        Err(e) => tracing::error!("Harvest stopped on fatal fault: {}", e),
    }
}
