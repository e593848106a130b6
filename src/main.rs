//! Xeggex agent entry point.
//!
//! Loads configuration, initialises structured logging, opens the
//! snapshot file and event log, optionally serves the dashboard, and runs
//! the scheduled check loop with graceful shutdown.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use xeggex_agent::config::AppConfig;
use xeggex_agent::dashboard::{self, routes::DashboardState};
use xeggex_agent::engine::dispatcher::XeggexAgent;
use xeggex_agent::exchange::xeggex::XeggexClient;
use xeggex_agent::storage::events::SqliteEventLog;
use xeggex_agent::storage::JsonFileSnapshotStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load(&AppConfig::default_path())?;
    init_logging();

    info!(
        agent_name = %cfg.agent.name,
        mode = cfg.options.mode.as_deref().unwrap_or_default(),
        schedule_interval_secs = cfg.agent.schedule_interval_secs,
        dry_run = cfg.agent.dry_run,
        "Xeggex agent starting up"
    );

    if let Err(errors) = cfg.options.validate() {
        for message in errors.messages() {
            error!(agent = %cfg.agent.name, "{message}");
        }
        bail!("invalid options: {errors}");
    }

    // -- Initialise components -------------------------------------------

    let exchange = XeggexClient::new(cfg.exchange.base_url.clone())?;
    info!(base_url = exchange.base_url(), "Exchange client ready");

    let snapshots = JsonFileSnapshotStore::new(&cfg.agent.name, Some(&cfg.storage.snapshot_file));
    let event_log = SqliteEventLog::connect(&cfg.storage.event_db).await?;

    let health = Arc::new(RwLock::new(event_log.load_health(&cfg.agent.name).await?));

    let agent = XeggexAgent::new(
        &cfg.agent.name,
        cfg.options.clone(),
        Box::new(exchange),
        Box::new(snapshots),
        Box::new(event_log),
    )
    .with_dry_run(cfg.agent.dry_run)
    .with_health(health);

    let state = Arc::new(DashboardState::new(agent));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(Arc::clone(&state), cfg.dashboard.port).await?;
    } else {
        info!("Dashboard disabled");
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.schedule_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.schedule_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let mut agent = state.agent.lock().await;
                // Failures are already logged and recorded in health.
                if agent.check().await.is_err() {
                    warn!("Check failed, continuing to next tick");
                }
                if !agent.is_working().await {
                    warn!(agent = %cfg.agent.name, "Agent is not working");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let health = state.health.read().await;
    info!(
        ticks = health.ticks_run,
        events = health.events_created,
        errors = health.errors_logged,
        "Xeggex agent shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("xeggex_agent=info"));

    let json_logging = std::env::var("XEGGEX_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
