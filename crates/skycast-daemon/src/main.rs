//! Skycast Daemon - scheduled ingestion, training and prediction
//!
//! This binary coordinates:
//! - Hourly weather ingestion, raw archiving and historical merge
//! - Weekly model retraining and publishing
//! - Daily next-step predictions for every configured location

use anyhow::{Context, Result};
use chrono::Utc;
use skycast_core::Sink;
use skycast_obs::LogFormat;
use skycast_sinks::FsSink;
use tokio::sync::watch;
use tracing::{error, info};

use skycast_daemon::config::DaemonConfig;
use skycast_daemon::tasks::shared_sinks;
use skycast_daemon::{build_scheduler, build_source};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    skycast_obs::init("skycastd", LogFormat::from_env());

    info!("Starting Skycast Daemon");

    // Load configuration
    let daemon = DaemonConfig::from_env();
    info!("Loaded configuration: {:?}", daemon);
    let cfg = daemon.load_app_config()?;
    info!(
        "Locations: {}",
        cfg.location_names().join(", ")
    );

    let source = build_source(&cfg, daemon.api_key.as_deref())?;
    info!("Weather source: {}", source.name());

    let sinks = open_sinks(&cfg.paths.predictions_dir, &daemon).await?;
    let mut scheduler = build_scheduler(&cfg, source, shared_sinks(sinks), Utc::now())?;

    info!("Daemon running - press Ctrl+C to stop");

    // Ctrl+C is honoured between ticks, never in the middle of a task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, finishing current tick");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                // keep the sender alive so the scheduler is not stopped
                std::future::pending::<()>().await;
            }
        }
    });

    if let Err(e) = scheduler.run(shutdown_rx).await {
        error!("Scheduler error: {}", e);
        return Err(e);
    }

    info!("Skycast Daemon stopped");
    Ok(())
}

/// The filesystem prediction table, plus database stores compiled in and configured
async fn open_sinks(predictions_dir: &std::path::Path, daemon: &DaemonConfig) -> Result<Vec<Box<dyn Sink>>> {
    #[allow(unused_mut)]
    let mut sinks: Vec<Box<dyn Sink>> = vec![Box::new(
        FsSink::new(predictions_dir).context("Failed to open prediction table")?,
    )];

    #[cfg(feature = "sqlite")]
    if let Some(path) = &daemon.sqlite_path {
        let store = skycast_sinks::sqlite::SqliteStore::new(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        info!("SQLite store at {}", path.display());
        sinks.push(Box::new(store));
    }

    #[cfg(feature = "postgres")]
    if let Some(url) = &daemon.database_url {
        let store = skycast_sinks::postgres::PostgresStore::new(url)
            .await
            .context("Failed to connect to database")?;
        info!("Connected to database");
        sinks.push(Box::new(store));
    }

    #[cfg(not(any(feature = "sqlite", feature = "postgres")))]
    let _ = daemon;

    Ok(sinks)
}
