//! Load -> reconcile -> score -> rank.
//!
//! `run_*` are blocking. `compute_*` load their sources concurrently on the
//! blocking pool, each read bounded by a timeout, then reconcile in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::models::ReconciledRecord;
use crate::snapshots::{
    load_requirements, load_requirements_with_timeout, load_snapshot, load_snapshot_with_timeout,
    CoercionMode, LoadError, RequirementsTable, SnapshotTable, SourceKind,
};

use super::error::{PipelineError, ReconcileError};
use super::ranking::{assign_ranks, RankMode};
use super::reconcile::{reconcile, reconcile_period, JoinedParticipant};
use super::scoring::{score, ScoringWeights};

/// File locations of one whole-event computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSources {
    pub roster: PathBuf,
    pub before: PathBuf,
    pub after: PathBuf,
    pub requirements: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub weights: ScoringWeights,
    pub rank_mode: RankMode,
    pub coercion: CoercionMode,
}

/// Row counts of the sources a leaderboard was built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub roster: usize,
    pub before: usize,
    pub after: usize,
    pub requirements: usize,
}

#[derive(Debug, Clone)]
pub struct EventRun {
    pub records: Vec<ReconciledRecord>,
    pub counts: SourceCounts,
}

/// Reconcile, score and rank already-loaded tables.
///
/// Records come back in roster order with ranks assigned.
pub fn build_records(
    roster: &SnapshotTable,
    before: &SnapshotTable,
    after: &SnapshotTable,
    requirements: Option<&RequirementsTable>,
    options: &PipelineOptions,
) -> Result<Vec<ReconciledRecord>, ReconcileError> {
    let joined = reconcile(roster, before, after, requirements)?;
    Ok(finish(joined, options))
}

fn finish(
    joined: Vec<JoinedParticipant>,
    options: &PipelineOptions,
) -> Vec<ReconciledRecord> {
    let mut records: Vec<ReconciledRecord> = joined
        .into_iter()
        .map(|j| score(j, &options.weights))
        .collect();
    assign_ranks(&mut records, options.rank_mode);
    records
}

/// Full computation over the configured event sources.
pub fn run_event_pipeline(
    sources: &EventSources,
    options: &PipelineOptions,
) -> Result<EventRun, PipelineError> {
    let roster = load_mandatory(SourceKind::Roster, &sources.roster, options.coercion)?;
    let before = load_mandatory(SourceKind::Before, &sources.before, options.coercion)?;
    let after = load_mandatory(SourceKind::After, &sources.after, options.coercion)?;
    let requirements = load_requirements(sources.requirements.as_deref(), options.coercion);

    Ok(event_run(roster, before, after, requirements, options)?)
}

/// Async [`run_event_pipeline`] with a per-source load timeout.
pub async fn compute_event(
    sources: EventSources,
    options: PipelineOptions,
    timeout: Duration,
) -> Result<EventRun, PipelineError> {
    let mode = options.coercion;
    let (roster, before, after, requirements) = tokio::join!(
        load_timed(SourceKind::Roster, sources.roster, mode, timeout),
        load_timed(SourceKind::Before, sources.before, mode, timeout),
        load_timed(SourceKind::After, sources.after, mode, timeout),
        load_requirements_with_timeout(sources.requirements, mode, timeout),
    );

    Ok(event_run(roster?, before?, after?, requirements, &options)?)
}

fn event_run(
    roster: SnapshotTable,
    before: SnapshotTable,
    after: SnapshotTable,
    requirements: RequirementsTable,
    options: &PipelineOptions,
) -> Result<EventRun, ReconcileError> {
    let records = build_records(&roster, &before, &after, Some(&requirements), options)?;
    info!(
        participants = records.len(),
        rank_mode = ?options.rank_mode,
        "leaderboard computed"
    );

    Ok(EventRun {
        records,
        counts: SourceCounts {
            roster: roster.len(),
            before: before.len(),
            after: after.len(),
            requirements: requirements.len(),
        },
    })
}

/// Computation for one sub-period: roster ∩ start ∩ end, no requirements.
pub fn run_period_pipeline(
    roster: &Path,
    start: &Path,
    end: &Path,
    options: &PipelineOptions,
) -> Result<Vec<ReconciledRecord>, PipelineError> {
    let roster = load_mandatory(SourceKind::Roster, roster, options.coercion)?;
    let start = load_mandatory(SourceKind::PeriodStart, start, options.coercion)?;
    let end = load_mandatory(SourceKind::PeriodEnd, end, options.coercion)?;

    let joined = reconcile_period(&roster, &start, &end)?;
    Ok(finish(joined, options))
}

/// Async [`run_period_pipeline`] with a per-source load timeout.
pub async fn compute_period(
    roster: PathBuf,
    start: PathBuf,
    end: PathBuf,
    options: PipelineOptions,
    timeout: Duration,
) -> Result<Vec<ReconciledRecord>, PipelineError> {
    let mode = options.coercion;
    let (roster, start, end) = tokio::try_join!(
        load_timed(SourceKind::Roster, roster, mode, timeout),
        load_timed(SourceKind::PeriodStart, start, mode, timeout),
        load_timed(SourceKind::PeriodEnd, end, mode, timeout),
    )?;

    let joined = reconcile_period(&roster, &start, &end)?;
    Ok(finish(joined, &options))
}

fn load_mandatory(
    kind: SourceKind,
    path: &Path,
    mode: CoercionMode,
) -> Result<SnapshotTable, LoadError> {
    load_snapshot(kind, path, mode).map_err(|e| log_load_failure(kind, path, e))
}

async fn load_timed(
    kind: SourceKind,
    path: PathBuf,
    mode: CoercionMode,
    timeout: Duration,
) -> Result<SnapshotTable, LoadError> {
    let shown = path.clone();
    load_snapshot_with_timeout(kind, path, mode, timeout)
        .await
        .map_err(|e| log_load_failure(kind, &shown, e))
}

fn log_load_failure(kind: SourceKind, path: &Path, e: LoadError) -> LoadError {
    error!(source = %kind, path = %path.display(), kind = e.kind(), "{}", e);
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantSnapshotRow;

    fn row(id: &str, kp: i64, deaths: i64, t4: i64, t5: i64) -> ParticipantSnapshotRow {
        ParticipantSnapshotRow {
            participant_id: id.into(),
            display_name: Some(format!("Gov {}", id)),
            power: 1_000,
            kill_points: kp,
            deaths,
            tier4_kills: t4,
            tier5_kills: t5,
        }
    }

    #[test]
    fn test_build_records_scores_and_ranks() {
        let roster = SnapshotTable::new(
            SourceKind::Roster,
            vec![row("P1", 0, 0, 0, 0), row("P2", 0, 0, 0, 0), row("P3", 0, 0, 0, 0)],
        );
        let before = SnapshotTable::new(
            SourceKind::Before,
            vec![row("P1", 0, 0, 0, 0), row("P2", 0, 0, 0, 0), row("P3", 0, 0, 0, 0)],
        );
        // P1 = 44, P2 = 44, P3 = 50
        let after = SnapshotTable::new(
            SourceKind::After,
            vec![row("P1", 0, 2, 1, 1), row("P2", 0, 2, 1, 1), row("P3", 0, 2, 0, 2)],
        );

        let records = build_records(&roster, &before, &after, None, &PipelineOptions::default()).unwrap();
        let summary: Vec<(&str, i64, u32)> = records
            .iter()
            .map(|r| (r.participant_id.as_str(), r.composite_score, r.rank))
            .collect();
        assert_eq!(summary, vec![("P1", 44, 2), ("P2", 44, 2), ("P3", 50, 1)]);
        assert!(records.iter().all(|r| r.kills_completion_pct == 100.0));
    }

    #[test]
    fn test_missing_roster_is_load_error() {
        let sources = EventSources {
            roster: PathBuf::from("/nonexistent/roster.csv"),
            before: PathBuf::from("/nonexistent/before.csv"),
            after: PathBuf::from("/nonexistent/after.csv"),
            requirements: None,
        };
        let err = run_event_pipeline(&sources, &PipelineOptions::default()).unwrap_err();
        assert_eq!(err.kind(), "missing_source");
    }

    #[tokio::test]
    async fn test_async_compute_matches_blocking_run() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        let header = "Governor ID,Governor Name,Kill Points,Deads,T4 Kills,T5 Kills,Power";
        std::fs::write(d.join("roster.csv"), "Governor ID,Power\n1,10\n2,20\n").unwrap();
        std::fs::write(d.join("before.csv"), format!("{header}\n1,,0,0,0,0,10\n2,,0,0,0,0,20\n")).unwrap();
        std::fs::write(d.join("after.csv"), format!("{header}\n1,A,5,1,1,0,11\n2,B,9,0,0,1,19\n")).unwrap();
        let sources = EventSources {
            roster: d.join("roster.csv"),
            before: d.join("before.csv"),
            after: d.join("after.csv"),
            requirements: Some(d.join("requirements.csv")),
        };
        let options = PipelineOptions::default();

        let blocking = run_event_pipeline(&sources, &options).unwrap();
        let run = compute_event(sources, options, Duration::from_secs(5)).await.unwrap();
        assert_eq!(run.records, blocking.records);
        assert_eq!(run.counts, blocking.counts);

        let period = compute_period(
            d.join("roster.csv"),
            d.join("before.csv"),
            d.join("after.csv"),
            options,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(period.len(), 2);

        let err = compute_period(
            d.join("roster.csv"),
            d.join("nope.csv"),
            d.join("after.csv"),
            options,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "missing_source");
    }
}
