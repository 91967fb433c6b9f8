//! Composition root: owns the current leaderboard and the period cache.

use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::TrackerConfig;
use crate::engine::compute_event;
use crate::periods::PeriodCacheManager;
use crate::store::{LeaderboardExporter, LeaderboardMeta, LeaderboardStore};

pub struct TrackerService {
    config: TrackerConfig,
    current: ArcSwapOption<LeaderboardStore>,
    /// Serializes full recomputations
    recompute_guard: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<String>>,
    periods: PeriodCacheManager,
}

impl TrackerService {
    pub fn new(config: TrackerConfig) -> Self {
        let periods = PeriodCacheManager::new(
            config.data_dir.clone(),
            config.roster_file.clone(),
            config.periods.clone(),
            config.pipeline_options(),
            config.load_timeout(),
        );
        Self {
            config,
            current: ArcSwapOption::empty(),
            recompute_guard: tokio::sync::Mutex::new(()),
            last_error: Mutex::new(None),
            periods,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Current leaderboard, `None` until a computation has succeeded.
    pub fn leaderboard(&self) -> Option<Arc<LeaderboardStore>> {
        self.current.load_full()
    }

    pub fn periods(&self) -> &PeriodCacheManager {
        &self.periods
    }

    /// Message of the last failed computation, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Rebuild the leaderboard from the configured sources and swap it in.
    ///
    /// On failure the previous leaderboard (if any) stays in place.
    pub async fn recompute(&self) -> Result<Arc<LeaderboardStore>> {
        let _guard = self.recompute_guard.lock().await;

        let outcome = compute_event(
            self.config.event_sources(),
            self.config.pipeline_options(),
            self.config.load_timeout(),
        )
        .await;

        let run = match outcome {
            Ok(run) => run,
            Err(e) => {
                error!(kind = e.kind(), "leaderboard computation failed: {}", e);
                *self.last_error.lock() = Some(e.to_string());
                return Err(e.into());
            }
        };

        let store = Arc::new(LeaderboardStore::new(
            run.records,
            LeaderboardMeta::now(run.counts),
        ));
        self.current.store(Some(store.clone()));
        *self.last_error.lock() = None;
        info!(participants = store.len(), "leaderboard swapped in");

        if let Some(path) = self.config.export_db_path.clone() {
            let snapshot = store.clone();
            let exported = tokio::task::spawn_blocking(move || {
                LeaderboardExporter::open(&path)
                    .and_then(|exporter| exporter.export(&snapshot))
                    .with_context(|| format!("exporting leaderboard to {}", path.display()))
            })
            .await;

            match exported {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("leaderboard export failed: {:#}", e),
                Err(e) => warn!("leaderboard export task failed: {}", e),
            }
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_sources(dir: &std::path::Path) {
        fs::write(dir.join("kvk_start_power.csv"), "Governor ID,Power\n1,100\n2,200\n").unwrap();
        fs::write(
            dir.join("kvk_before_metrics.csv"),
            "Governor ID,Kill Points,Deads,T4 Kills,T5 Kills,Power\n1,0,0,0,0,100\n2,0,0,0,0,200\n",
        )
        .unwrap();
        fs::write(
            dir.join("kvk_after_metrics.csv"),
            "Governor ID,Governor Name,Kill Points,Deads,T4 Kills,T5 Kills,Power\n\
             1,Alpha,10,1,0,0,90\n2,Beta,20,0,1,1,210\n",
        )
        .unwrap();
    }

    fn config(dir: &std::path::Path) -> TrackerConfig {
        TrackerConfig {
            data_dir: dir.to_path_buf(),
            roster_file: "kvk_start_power.csv".into(),
            before_file: "kvk_before_metrics.csv".into(),
            after_file: "kvk_after_metrics.csv".into(),
            export_db_path: Some(dir.join("out.db")),
            ..TrackerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_recompute_swaps_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        let service = TrackerService::new(config(dir.path()));
        assert!(service.leaderboard().is_none());

        let store = service.recompute().await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(Arc::ptr_eq(&store, &service.leaderboard().unwrap()));
        assert!(service.last_error().is_none());

        let (exported, _) = crate::store::read_exported(dir.path().join("out.db")).unwrap();
        assert_eq!(exported.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_recompute_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        let service = TrackerService::new(config(dir.path()));
        let first = service.recompute().await.unwrap();

        fs::remove_file(dir.path().join("kvk_after_metrics.csv")).unwrap();
        assert!(service.recompute().await.is_err());
        assert!(service.last_error().is_some());
        assert!(Arc::ptr_eq(&first, &service.leaderboard().unwrap()));
    }

    #[tokio::test]
    async fn test_export_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        let mut cfg = config(dir.path());
        cfg.export_db_path = Some(dir.path().join("missing-dir/nested/out.db"));
        let service = TrackerService::new(cfg);

        assert!(service.recompute().await.is_ok());
        assert!(service.leaderboard().is_some());
    }
}
