//! Snapshot Loader
//!
//! Reads raw tabular exports (XLSX, CSV or JSON), resolves column aliases to
//! canonical fields, normalizes participant ids and coerces metrics into
//! typed rows. Downstream code never looks at column names again.
//!
//! Mandatory sources fail loudly (`LoadError`); the optional requirements
//! source degrades to an empty table with a warning.

pub mod coerce;
pub mod columns;
pub mod error;
pub mod reader;

pub use coerce::CoercionMode;
pub use columns::Column;
pub use error::LoadError;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::models::{ParticipantSnapshotRow, RequirementSpec};
use coerce::{coerce_metric, normalize_id, normalize_name};
use columns::ColumnMap;
use reader::{read_table, RawTable};

/// Which role a source plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Roster,
    Before,
    After,
    Requirements,
    PeriodStart,
    PeriodEnd,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Roster => "roster",
            SourceKind::Before => "before",
            SourceKind::After => "after",
            SourceKind::Requirements => "requirements",
            SourceKind::PeriodStart => "period start",
            SourceKind::PeriodEnd => "period end",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed rows of one snapshot, in file order, one row per participant.
#[derive(Debug, Clone)]
pub struct SnapshotTable {
    pub kind: SourceKind,
    pub path: PathBuf,
    pub rows: Vec<ParticipantSnapshotRow>,
}

impl SnapshotTable {
    pub fn new(kind: SourceKind, rows: Vec<ParticipantSnapshotRow>) -> Self {
        Self {
            kind,
            path: PathBuf::new(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Requirements keyed by participant; empty when the source is absent.
#[derive(Debug, Clone, Default)]
pub struct RequirementsTable {
    by_id: HashMap<String, RequirementSpec>,
}

impl RequirementsTable {
    pub fn from_rows(rows: impl IntoIterator<Item = RequirementSpec>) -> Self {
        let mut by_id = HashMap::new();
        for row in rows {
            by_id.entry(row.participant_id.clone()).or_insert(row);
        }
        Self { by_id }
    }

    pub fn get(&self, participant_id: &str) -> Option<&RequirementSpec> {
        self.by_id.get(participant_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Load a mandatory metrics snapshot.
pub fn load_snapshot(
    kind: SourceKind,
    path: &Path,
    mode: CoercionMode,
) -> Result<SnapshotTable, LoadError> {
    let raw = read_mandatory(kind, path)?;
    let columns = resolve_columns(kind, path, &raw)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates = 0usize;
    let mut rows = Vec::with_capacity(raw.records.len());

    for idx in 0..raw.records.len() {
        let Some(id) = columns
            .position(Column::ParticipantId)
            .and_then(|pos| normalize_id(raw.cell(idx, pos)))
        else {
            debug!(source = %kind, row = idx + 1, "dropping row without participant id");
            continue;
        };
        if !seen.insert(id.clone()) {
            duplicates += 1;
            continue;
        }

        let metric = |column: Column| metric_at(&raw, &columns, idx, column, mode, kind, path);
        rows.push(ParticipantSnapshotRow {
            participant_id: id,
            display_name: columns
                .position(Column::DisplayName)
                .and_then(|pos| normalize_name(raw.cell(idx, pos))),
            power: metric(Column::Power)?,
            kill_points: metric(Column::KillPoints)?,
            deaths: metric(Column::Deaths)?,
            tier4_kills: metric(Column::Tier4Kills)?,
            tier5_kills: metric(Column::Tier5Kills)?,
        });
    }

    if duplicates > 0 {
        warn!(
            source = %kind,
            path = %path.display(),
            duplicates,
            "duplicate participant ids ignored (first occurrence kept)"
        );
    }
    if rows.is_empty() {
        return Err(LoadError::EmptyDataset {
            source: kind,
            path: path.to_path_buf(),
        });
    }

    info!(
        source = %kind,
        path = %path.display(),
        rows = rows.len(),
        "snapshot loaded"
    );

    Ok(SnapshotTable {
        kind,
        path: path.to_path_buf(),
        rows,
    })
}

/// Load the requirements table.
///
/// Any failure (absent file, unreadable, missing columns, empty) is logged
/// and replaced by an empty table, which means every requirement is 0.
pub fn load_requirements(path: Option<&Path>, mode: CoercionMode) -> RequirementsTable {
    let Some(path) = path else {
        warn!("no requirements source configured; all requirements default to 0");
        return RequirementsTable::default();
    };
    if !path.exists() {
        warn!(
            path = %path.display(),
            "requirements source not found; all requirements default to 0"
        );
        return RequirementsTable::default();
    }

    match try_load_requirements(path, mode) {
        Ok(table) => {
            info!(path = %path.display(), rows = table.len(), "requirements loaded");
            table
        }
        Err(e) => {
            warn!("{}; all requirements default to 0", e);
            RequirementsTable::default()
        }
    }
}

fn try_load_requirements(path: &Path, mode: CoercionMode) -> Result<RequirementsTable, LoadError> {
    let kind = SourceKind::Requirements;
    let raw = read_mandatory(kind, path)?;
    let columns = resolve_columns(kind, path, &raw)?;

    let mut rows = Vec::with_capacity(raw.records.len());
    for idx in 0..raw.records.len() {
        let Some(id) = columns
            .position(Column::ParticipantId)
            .and_then(|pos| normalize_id(raw.cell(idx, pos)))
        else {
            continue;
        };
        rows.push(RequirementSpec {
            participant_id: id,
            required_kills: metric_at(&raw, &columns, idx, Column::RequiredKills, mode, kind, path)?,
            required_deaths: metric_at(&raw, &columns, idx, Column::RequiredDeaths, mode, kind, path)?,
        });
    }

    Ok(RequirementsTable::from_rows(rows))
}

/// Async wrapper: reads on the blocking pool and bounds the wait.
pub async fn load_snapshot_with_timeout(
    kind: SourceKind,
    path: PathBuf,
    mode: CoercionMode,
    timeout: Duration,
) -> Result<SnapshotTable, LoadError> {
    let task_path = path.clone();
    run_blocking_load(kind, path, timeout, move || load_snapshot(kind, &task_path, mode)).await
}

/// Async [`load_requirements`]. A timeout degrades to an empty table like
/// any other requirements failure.
pub async fn load_requirements_with_timeout(
    path: Option<PathBuf>,
    mode: CoercionMode,
    timeout: Duration,
) -> RequirementsTable {
    let Some(path) = path else {
        return load_requirements(None, mode);
    };
    let task_path = path.clone();
    let job = move || Ok(load_requirements(Some(&task_path), mode));
    match run_blocking_load(SourceKind::Requirements, path, timeout, job).await {
        Ok(table) => table,
        Err(e) => {
            warn!("{}; all requirements default to 0", e);
            RequirementsTable::default()
        }
    }
}

/// Run a blocking read on the blocking pool, giving up after `timeout`.
///
/// The read itself is not cancelled; its result is dropped when it finishes.
pub(crate) async fn run_blocking_load<T, F>(
    kind: SourceKind,
    path: PathBuf,
    timeout: Duration,
    job: F,
) -> Result<T, LoadError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LoadError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(job);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(LoadError::Unreadable {
            source: kind,
            path,
            reason: format!("loader task failed: {}", join_err),
        }),
        Err(_) => {
            warn!(source = %kind, path = %path.display(), after = ?timeout, "snapshot load timed out");
            Err(LoadError::TimedOut {
                source: kind,
                path,
                after: timeout,
            })
        }
    }
}

fn read_mandatory(kind: SourceKind, path: &Path) -> Result<RawTable, LoadError> {
    if !path.exists() {
        return Err(LoadError::MissingSource {
            source: kind,
            path: path.to_path_buf(),
        });
    }
    let raw = read_table(path).map_err(|reason| LoadError::Unreadable {
        source: kind,
        path: path.to_path_buf(),
        reason,
    })?;
    if raw.records.is_empty() {
        return Err(LoadError::EmptyDataset {
            source: kind,
            path: path.to_path_buf(),
        });
    }
    Ok(raw)
}

fn resolve_columns(kind: SourceKind, path: &Path, raw: &RawTable) -> Result<ColumnMap, LoadError> {
    let columns = ColumnMap::from_headers(&raw.headers);
    match columns.first_missing(kind) {
        Some(missing) => Err(LoadError::MissingColumn {
            source: kind,
            path: path.to_path_buf(),
            column: missing.as_str(),
        }),
        None => Ok(columns),
    }
}

fn metric_at(
    raw: &RawTable,
    columns: &ColumnMap,
    idx: usize,
    column: Column,
    mode: CoercionMode,
    kind: SourceKind,
    path: &Path,
) -> Result<i64, LoadError> {
    let Some(pos) = columns.position(column) else {
        return Ok(0);
    };
    coerce_metric(raw.cell(idx, pos), mode).map_err(|value| LoadError::InvalidValue {
        source: kind,
        path: path.to_path_buf(),
        row: idx + 1,
        column: column.as_str(),
        value,
    })
}
