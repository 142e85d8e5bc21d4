//! # IronMart Sync Daemon
//!
//! Long-running process on the store server that keeps the marketplace and
//! Tally Prime in step.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Daemon Process                             │
//! │                                                                         │
//! │  Admin UI ───► axum (8787) ───► TallySyncEngine ───► SQLite            │
//! │                                       │                                 │
//! │                     Scheduler ────────┤                                 │
//! │                     (4 job loops)     ▼                                 │
//! │                                  Tally Prime                            │
//! │                                  (HTTP + XML)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ironmart_db::{Database, DbConfig};
use ironmart_sync::{SyncConfig, TallySyncEngine};
use ironmart_sync_daemon::router;

const DEFAULT_LOG_FILTER: &str = "info,ironmart=debug,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting IronMart sync daemon...");

    // Load configuration
    let config = SyncConfig::load(None).context("Failed to load sync configuration")?;
    info!(
        tally_url = %config.tally.url,
        enabled = config.tally.enabled,
        db_path = %config.database.path.display(),
        "Configuration loaded"
    );

    // Open the marketplace database
    let db = Database::new(DbConfig::new(config.database.path.clone()))
        .await
        .context("Failed to open marketplace database")?;
    let db = Arc::new(db);
    info!("Database ready");

    // Build the engine and start the job loops
    let bind_addr = config.admin.bind_address();
    let engine = Arc::new(
        TallySyncEngine::connect(config, db).context("Failed to build Tally sync engine")?,
    );
    let scheduler = engine.scheduler().start();

    // Serve the admin API until a shutdown signal arrives
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind admin API to {}", bind_addr))?;
    info!(addr = %bind_addr, "Admin API listening");

    axum::serve(listener, router(Arc::clone(&engine)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Admin API server failed")?;

    scheduler.shutdown().await;

    info!("Daemon shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
///
/// A handler that fails to install never fires; the other one still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
