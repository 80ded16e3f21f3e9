//! news-send - Daemon that turns fresh feed items into social posts
//!
//! Every interval it collects today's items from the configured feeds, asks
//! the classifier which one is worth posting, and publishes at most one.

use clap::Parser;
use libnewscast::logging::LoggingConfig;
use libnewscast::{Config, NewscastError, Orchestrator, Result, Scheduler};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "news-send")]
#[command(version)]
#[command(about = "Daemon that turns fresh feed items into social posts")]
#[command(long_about = "\
news-send - Daemon that turns fresh feed items into social posts

DESCRIPTION:
    news-send polls the configured news feeds, keeps items published today,
    asks a text generation service whether each one is on topic, and posts
    the first approved item to X. Handled items are remembered in a ledger
    so nothing is classified or posted twice.

USAGE:
    # Run in foreground (logs to stderr)
    news-send

    # Run a single cycle and exit
    news-send --once

    # Use another config file and a 30 minute interval
    news-send --config ./newscast.toml --interval 1800

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (ends the current cycle at its next
                      candidate or retry wait)

CONFIGURATION:
    Configuration file: ~/.config/newscast/config.toml (or $NEWSCAST_CONFIG)
    Secrets are read from the environment variables named in the file.
    Logging: NEWSCAST_LOG_FORMAT (text, json, pretty), NEWSCAST_LOG_LEVEL

EXIT CODES:
    0 - Clean shutdown, or --once completed
    1 - Runtime error
    2 - Configuration error
    3 - Classifier service persistently rate limited
")]
struct Cli {
    /// Path to the config file (overrides NEWSCAST_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between cycles (overrides config)
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Run one cycle and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(interval) = cli.interval {
        if interval == 0 {
            return Err(NewscastError::InvalidInput(
                "--interval must be greater than zero".to_string(),
            ));
        }
        config.schedule.interval_secs = interval;
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    let mut scheduler = Scheduler::new(orchestrator);

    info!(
        "news-send starting: {} feed(s), interval {}",
        config.feeds.urls.len(),
        humantime::format_duration(Duration::from_secs(config.schedule.interval_secs))
    );

    if cli.once {
        match scheduler.run_single().await? {
            Some(report) => info!("news-send: cycle ended with {:?}", report.outcome),
            None => info!("news-send: cycle aborted by a panic"),
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    scheduler.run(shutdown).await?;
    info!("news-send stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| NewscastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
