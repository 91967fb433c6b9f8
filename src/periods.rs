//! Period Cache Manager
//!
//! Sub-period leaderboards (one per named battle phase) computed on first
//! request and memoized for the process lifetime.
//!
//! Per key: `NotRequested -> Loading -> Cached`, or `Loading -> Unavailable`
//! when the period's files do not exist yet. Both end states are terminal.
//! A load failure or an empty join is reported to the caller and the key
//! goes back to `NotRequested`, so the next request tries again.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{compute_period, PipelineError, PipelineOptions, ReconcileError};
use crate::models::ReconciledRecord;
use crate::snapshots::LoadError;
use crate::store::{AggregateTotals, LeaderboardMeta, LeaderboardStore};

/// Start/end snapshot files of one period, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSources {
    pub start: PathBuf,
    pub end: PathBuf,
    /// Human-readable label, defaults to the key
    #[serde(default)]
    pub label: Option<String>,
}

impl PeriodSources {
    pub fn new(start: impl Into<PathBuf>, end: impl Into<PathBuf>, label: &str) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            label: Some(label.to_string()),
        }
    }
}

/// The event's standard battle phases.
pub fn default_periods() -> BTreeMap<String, PeriodSources> {
    BTreeMap::from([
        (
            "zone5".to_string(),
            PeriodSources::new("zone 5/start_zone5.xlsx", "zone 5/end_zone5.xlsx", "Zone 5"),
        ),
        (
            "altars".to_string(),
            PeriodSources::new("altars/start_altars.xlsx", "altars/end_altars.xlsx", "Altars"),
        ),
        (
            "pass7".to_string(),
            PeriodSources::new("pass 7/start_pass7.xlsx", "pass 7/end_pass7.xlsx", "Pass 7"),
        ),
        (
            "kingsland".to_string(),
            PeriodSources::new(
                "kingsland/start_kingsland.xlsx",
                "kingsland/end_kingsland.xlsx",
                "Kingsland",
            ),
        ),
    ])
}

/// Reconciled records of one period.
#[derive(Debug, Clone)]
pub struct PeriodTable {
    pub key: String,
    pub label: String,
    pub store: LeaderboardStore,
}

impl PeriodTable {
    pub fn computed_at(&self) -> DateTime<Utc> {
        self.store.meta().computed_at
    }

    pub fn totals(&self) -> AggregateTotals {
        self.store.get_aggregate_totals()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodState {
    NotRequested,
    Loading,
    Cached,
    Unavailable,
}

#[derive(Debug, Clone)]
pub enum PeriodError {
    UnknownPeriod { key: String, available: Vec<String> },
    /// Period files do not exist yet: the battle has not started
    Unavailable { key: String, missing: PathBuf },
    /// Files exist but no participant overlaps yet
    Pending { key: String },
    Load { key: String, error: PipelineError },
    TimedOut { key: String, after: Duration },
}

impl PeriodError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownPeriod { .. } => "unknown_period",
            Self::Unavailable { .. } => "period_unavailable",
            Self::Pending { .. } => "period_pending",
            Self::Load { .. } => "period_load_failed",
            Self::TimedOut { .. } => "load_timeout",
        }
    }
}

impl std::fmt::Display for PeriodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPeriod { key, available } => write!(
                f,
                "unknown period '{}' (available: {})",
                key,
                available.join(", ")
            ),
            Self::Unavailable { key, missing } => write!(
                f,
                "period '{}' has not started yet ({} not found)",
                key,
                missing.display()
            ),
            Self::Pending { key } => write!(f, "results for period '{}' are pending", key),
            Self::Load { key, error } => write!(f, "period '{}': {}", key, error),
            Self::TimedOut { key, after } => {
                write!(f, "period '{}' computation timed out after {:?}", key, after)
            }
        }
    }
}

impl std::error::Error for PeriodError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Ready(Arc<PeriodTable>),
    Unavailable(PathBuf),
}

/// Lazily computed, memoized period tables with one in-flight computation
/// per key.
pub struct PeriodCacheManager {
    data_dir: PathBuf,
    roster: PathBuf,
    periods: BTreeMap<String, PeriodSources>,
    options: PipelineOptions,
    load_timeout: Duration,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Slot>>>>,
    /// Last state written by `get_period`, readable without the slot lock
    states: Mutex<HashMap<String, PeriodState>>,
}

impl PeriodCacheManager {
    /// `roster` and period paths are resolved against `data_dir` unless
    /// absolute.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        roster: impl Into<PathBuf>,
        periods: BTreeMap<String, PeriodSources>,
        options: PipelineOptions,
        load_timeout: Duration,
    ) -> Self {
        let periods = periods
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();
        Self {
            data_dir: data_dir.into(),
            roster: roster.into(),
            periods,
            options,
            load_timeout,
            slots: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.periods.keys().cloned().collect()
    }

    pub fn label(&self, key: &str) -> Option<String> {
        let key = normalize_key(key);
        self.periods
            .get(&key)
            .map(|p| p.label.clone().unwrap_or_else(|| key.clone()))
    }

    /// `None` for an unknown key.
    pub fn state(&self, key: &str) -> Option<PeriodState> {
        let key = normalize_key(key);
        if !self.periods.contains_key(&key) {
            return None;
        }
        let state = self
            .states
            .lock()
            .get(&key)
            .copied()
            .unwrap_or(PeriodState::NotRequested);
        if state != PeriodState::Loading {
            return Some(state);
        }

        // a cancelled request can leave `Loading` behind with nobody computing
        let in_flight = self
            .slots
            .lock()
            .get(&key)
            .map_or(false, |slot| slot.try_lock().is_err());
        Some(if in_flight {
            PeriodState::Loading
        } else {
            PeriodState::NotRequested
        })
    }

    fn set_state(&self, key: &str, state: PeriodState) {
        self.states.lock().insert(key.to_string(), state);
    }

    /// Period table for `key`, computing it on first request.
    ///
    /// Concurrent callers for the same key wait for the one computation in
    /// flight and share its result.
    pub async fn get_period(&self, key: &str) -> Result<Arc<PeriodTable>, PeriodError> {
        let key = normalize_key(key);
        let Some(sources) = self.periods.get(&key).cloned() else {
            return Err(PeriodError::UnknownPeriod {
                key,
                available: self.keys(),
            });
        };

        let slot = self.slots.lock().entry(key.clone()).or_default().clone();
        let mut guard = slot.lock().await;

        match &*guard {
            Slot::Ready(table) => return Ok(table.clone()),
            Slot::Unavailable(missing) => {
                return Err(PeriodError::Unavailable {
                    key,
                    missing: missing.clone(),
                })
            }
            Slot::Empty => {}
        }

        self.set_state(&key, PeriodState::Loading);
        let start = self.resolve(&sources.start);
        let end = self.resolve(&sources.end);
        if let Some(missing) = [&start, &end].into_iter().find(|p| !p.exists()) {
            info!(period = %key, missing = %missing.display(), "period has not started");
            *guard = Slot::Unavailable(missing.clone());
            self.set_state(&key, PeriodState::Unavailable);
            return Err(PeriodError::Unavailable {
                key,
                missing: missing.clone(),
            });
        }

        let records = match self.compute(&key, start, end).await {
            Ok(records) => records,
            Err(e) => {
                self.set_state(&key, PeriodState::NotRequested);
                return Err(e);
            }
        };
        let table = Arc::new(PeriodTable {
            label: sources.label.clone().unwrap_or_else(|| key.clone()),
            key: key.clone(),
            store: LeaderboardStore::new(records, LeaderboardMeta::now(Default::default())),
        });
        info!(period = %key, participants = table.store.len(), "period cached");
        *guard = Slot::Ready(table.clone());
        self.set_state(&key, PeriodState::Cached);
        Ok(table)
    }

    async fn compute(
        &self,
        key: &str,
        start: PathBuf,
        end: PathBuf,
    ) -> Result<Vec<ReconciledRecord>, PeriodError> {
        let roster = self.resolve(&self.roster);
        compute_period(roster, start, end, self.options, self.load_timeout)
            .await
            .map_err(|error| period_error(key, error))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }
}

/// Empty overlap means the period is still pending, not broken.
fn period_error(key: &str, error: PipelineError) -> PeriodError {
    let key = key.to_string();
    match error {
        PipelineError::Reconcile(ReconcileError::EmptyResult { .. }) => {
            info!(period = %key, "period results pending (no overlapping participants)");
            PeriodError::Pending { key }
        }
        PipelineError::Load(LoadError::TimedOut { after, .. }) => {
            warn!(period = %key, after = ?after, "period computation timed out");
            PeriodError::TimedOut { key, after }
        }
        error => PeriodError::Load { key, error },
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ROSTER: &str = "Governor ID,Power\n1,100\n2,200\n";
    const START: &str = "Governor ID,Governor Name,Kill Points,Deads,T4 Kills,T5 Kills,Power\n\
                         1,Alpha,0,0,0,0,100\n2,Beta,0,0,0,0,200\n";
    const END: &str = "Governor ID,Governor Name,Kill Points,Deads,T4 Kills,T5 Kills,Power\n\
                       1,Alpha,10,1,1,0,90\n2,,20,2,0,1,180\n";

    fn manager(dir: &Path) -> PeriodCacheManager {
        let mut periods = BTreeMap::new();
        periods.insert("Zone5".to_string(), PeriodSources::new("z/start.csv", "z/end.csv", "Zone 5"));
        PeriodCacheManager::new(
            dir,
            "roster.csv",
            periods,
            PipelineOptions::default(),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_unknown_period() {
        let dir = tempfile::tempdir().unwrap();
        let err = manager(dir.path()).get_period("nope").await.unwrap_err();
        match err {
            PeriodError::UnknownPeriod { available, .. } => assert_eq!(available, vec!["zone5"]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_files_are_unavailable_and_terminal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roster.csv"), ROSTER).unwrap();
        let cache = manager(dir.path());

        assert_eq!(cache.state("zone5"), Some(PeriodState::NotRequested));
        let err = cache.get_period("ZONE5").await.unwrap_err();
        assert_eq!(err.kind(), "period_unavailable");
        assert_eq!(cache.state("zone5"), Some(PeriodState::Unavailable));

        // files appearing later do not revive the key
        fs::create_dir_all(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z/start.csv"), START).unwrap();
        fs::write(dir.path().join("z/end.csv"), END).unwrap();
        assert_eq!(cache.get_period("zone5").await.unwrap_err().kind(), "period_unavailable");
    }

    #[tokio::test]
    async fn test_period_is_computed_once_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roster.csv"), ROSTER).unwrap();
        fs::create_dir_all(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z/start.csv"), START).unwrap();
        fs::write(dir.path().join("z/end.csv"), END).unwrap();
        let cache = manager(dir.path());

        let first = cache.get_period("zone5").await.unwrap();
        assert_eq!(first.label, "Zone 5");
        assert_eq!(first.store.len(), 2);
        assert_eq!(first.store.get_by_id("2").unwrap().display_name, "Beta");
        assert_eq!(first.totals().total_kills_change, 30);
        assert_eq!(cache.state("zone5"), Some(PeriodState::Cached));

        // source changes are not picked up once cached
        fs::remove_file(dir.path().join("z/end.csv")).unwrap();
        let second = cache.get_period("zone5").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_empty_overlap_is_pending_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roster.csv"), "Governor ID,Power\n9,1\n").unwrap();
        fs::create_dir_all(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z/start.csv"), START).unwrap();
        fs::write(dir.path().join("z/end.csv"), END).unwrap();
        let cache = manager(dir.path());

        assert_eq!(cache.get_period("zone5").await.unwrap_err().kind(), "period_pending");
        assert_eq!(cache.state("zone5"), Some(PeriodState::NotRequested));

        fs::write(dir.path().join("roster.csv"), ROSTER).unwrap();
        assert!(cache.get_period("zone5").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roster.csv"), ROSTER).unwrap();
        fs::create_dir_all(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z/start.csv"), START).unwrap();
        fs::write(dir.path().join("z/end.csv"), END).unwrap();
        let cache = Arc::new(manager(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_period("zone5").await })
            })
            .collect();

        let mut tables = Vec::new();
        for h in handles {
            tables.push(h.await.unwrap().unwrap());
        }
        assert!(tables.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_state_ignores_readers_holding_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roster.csv"), ROSTER).unwrap();
        fs::create_dir_all(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("z/start.csv"), START).unwrap();
        fs::write(dir.path().join("z/end.csv"), END).unwrap();
        let cache = manager(dir.path());
        cache.get_period("zone5").await.unwrap();

        let slot = cache.slots.lock().get("zone5").cloned().unwrap();
        let _held = slot.lock().await;
        assert_eq!(cache.state("zone5"), Some(PeriodState::Cached));
    }

    #[tokio::test]
    async fn test_loading_only_while_computation_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let cache = manager(dir.path());
        let slot = cache.slots.lock().entry("zone5".into()).or_default().clone();
        cache.set_state("zone5", PeriodState::Loading);

        {
            let _computing = slot.lock().await;
            assert_eq!(cache.state("zone5"), Some(PeriodState::Loading));
        }
        // request dropped mid-computation
        assert_eq!(cache.state("zone5"), Some(PeriodState::NotRequested));
    }

    #[test]
    fn test_pipeline_errors_map_to_period_errors() {
        use crate::snapshots::SourceKind;

        let timed_out = PipelineError::Load(LoadError::TimedOut {
            source: SourceKind::PeriodEnd,
            path: PathBuf::from("z/end.csv"),
            after: Duration::from_secs(3),
        });
        match period_error("zone5", timed_out) {
            PeriodError::TimedOut { key, after } => {
                assert_eq!(key, "zone5");
                assert_eq!(after, Duration::from_secs(3));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let missing = PipelineError::Load(LoadError::MissingSource {
            source: SourceKind::Roster,
            path: PathBuf::from("roster.csv"),
        });
        assert_eq!(period_error("zone5", missing).kind(), "period_load_failed");

        let empty = PipelineError::Reconcile(ReconcileError::EmptyResult {
            roster: 1,
            before: 1,
            after: 1,
        });
        assert_eq!(period_error("zone5", empty).kind(), "period_pending");
    }
}
