// League coordinator entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Build notifier and services
// 5. Spawn the window scheduler and draft clock loops
// 6. Wait for Ctrl+C
// 7. Signal shutdown and wait for both loops

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};

use dugout_app::app;
use dugout_core::config;
use dugout_core::db::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("League coordinator starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, season={}, off_season={}",
        config.league.name, config.league.season, config.league.off_season
    );

    // 3. Open database
    let store = SqliteStore::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Build notifier and services
    let notifier = app::build_notifier(&config);
    let services = app::build_services(&config, Arc::new(store), notifier);
    app::log_startup_status(&services).await;

    // 5. Spawn both polling loops
    let loops = app::spawn_loops(&services);
    info!("Scheduler and draft clock running. Press Ctrl+C to stop.");

    // 6. Wait for Ctrl+C
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutdown requested");

    // 7. Cleanup
    loops.shutdown(Duration::from_secs(5)).await;

    info!("League coordinator shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/dugout.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("dugout.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dugout_core=info,dugout_app=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
