//! KvK Tracker - leaderboard server
//!
//! Computes the whole-event leaderboard at startup and serves it, together
//! with lazily computed period tables, over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use kvk_tracker_backend::{api::create_router, init_tracing, TrackerConfig, TrackerService};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let config = TrackerConfig::from_env().context("loading configuration")?;

    info!(
        data_dir = %config.data_dir.display(),
        periods = config.periods.len(),
        rank_mode = ?config.rank_mode,
        "KvK tracker starting"
    );

    let addr = config.socket_addr()?;
    let service = Arc::new(TrackerService::new(config));

    // Queries answer 503 until a computation succeeds
    if let Err(e) = service.recompute().await {
        error!("initial leaderboard unavailable: {:#}", e);
    }

    let app = create_router(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
