//! KvK Tracker Backend Library
//!
//! Snapshot reconciliation and leaderboard computation for KvK events,
//! plus the query surface used by the server and CLI binaries.

pub mod api;
pub mod config;
pub mod engine;
pub mod models;
pub mod periods;
pub mod service;
pub mod snapshots;
pub mod store;

pub use config::TrackerConfig;
pub use service::TrackerService;

/// Install the `tracing` subscriber used by the binaries.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvk_tracker_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
