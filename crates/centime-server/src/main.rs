//! # centime-server
//!
//! HTTP backend for the Centime expense tracker.
//!
//! This binary provides:
//! - **REST API** (axum) for expenses, budgets, categories, recent
//!   activities, and the dashboard summary
//! - **Budget consistency**: every expense mutation re-aggregates the
//!   affected category's `spent` total onto its budget
//! - **Trailing-window activity log** keeping the 5 most recent mutations
//! - **WebSocket push** of budget-limit and large-expense warnings to all
//!   connected clients

mod api;
mod config;
mod constants;
mod error;
mod expenses;
mod notify;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use centime_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::notify::NotificationHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,centime_server=debug")),
        )
        .init();

    info!("Starting Centime server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Expense database (explicit path, or the platform data directory)
    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    // Live WebSocket connections for warning push
    let hub = NotificationHub::new();

    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        hub,
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    let http_addr = config.http_addr;
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
