//! SQLite export of the leaderboard.
//!
//! Each full computation overwrites the `leaderboard` table in one
//! transaction and appends a row to `leaderboard_runs`. The artifact is a
//! read-only copy for external consumers; queries never read it back.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::ReconciledRecord;

use super::LeaderboardStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS leaderboard (
        participant_id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        power_at_start INTEGER NOT NULL,
        matchmaking_power INTEGER NOT NULL,
        kill_points_before INTEGER NOT NULL,
        kill_points_after INTEGER NOT NULL,
        kill_points_change INTEGER NOT NULL,
        deaths_before INTEGER NOT NULL,
        deaths_after INTEGER NOT NULL,
        deaths_change INTEGER NOT NULL,
        tier4_kills_before INTEGER NOT NULL,
        tier4_kills_after INTEGER NOT NULL,
        tier4_kills_change INTEGER NOT NULL,
        tier5_kills_before INTEGER NOT NULL,
        tier5_kills_after INTEGER NOT NULL,
        tier5_kills_change INTEGER NOT NULL,
        power_before INTEGER NOT NULL,
        power_after INTEGER NOT NULL,
        power_change INTEGER NOT NULL,
        total_kills_change INTEGER NOT NULL,
        required_kills INTEGER NOT NULL,
        required_deaths INTEGER NOT NULL,
        composite_score INTEGER NOT NULL,
        kills_completion_pct REAL NOT NULL,
        deaths_completion_pct REAL NOT NULL,
        rank INTEGER NOT NULL,
        position INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS leaderboard_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        computed_at TEXT NOT NULL,
        exported_at TEXT NOT NULL,
        row_count INTEGER NOT NULL
    );
"#;

const COLUMNS: &str = "participant_id, display_name, power_at_start, matchmaking_power, \
    kill_points_before, kill_points_after, kill_points_change, \
    deaths_before, deaths_after, deaths_change, \
    tier4_kills_before, tier4_kills_after, tier4_kills_change, \
    tier5_kills_before, tier5_kills_after, tier5_kills_change, \
    power_before, power_after, power_change, total_kills_change, \
    required_kills, required_deaths, composite_score, \
    kills_completion_pct, deaths_completion_pct, rank";

#[derive(Debug)]
pub enum ExportError {
    Sqlite(rusqlite::Error),
    InvalidTimestamp(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "SQLite error: {}", e),
            Self::InvalidTimestamp(s) => write!(f, "invalid timestamp in export: {}", s),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::InvalidTimestamp(_) => None,
        }
    }
}

impl From<rusqlite::Error> for ExportError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// Row of `leaderboard_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRun {
    pub computed_at: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub row_count: usize,
}

/// Writer for the persisted leaderboard artifact.
pub struct LeaderboardExporter {
    conn: Arc<Mutex<Connection>>,
}

impl LeaderboardExporter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;
        Self::with_connection(conn)
    }

    /// In-memory database (tests).
    pub fn in_memory() -> Result<Self, ExportError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ExportError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace the exported table with `store`'s records.
    pub fn export(&self, store: &LeaderboardStore) -> Result<usize, ExportError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM leaderboard", [])?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO leaderboard ({}, position) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
                COLUMNS
            ))?;
            for (position, r) in store.records().iter().enumerate() {
                stmt.execute(params![
                    r.participant_id,
                    r.display_name,
                    r.power_at_start,
                    r.matchmaking_power,
                    r.kill_points_before,
                    r.kill_points_after,
                    r.kill_points_change,
                    r.deaths_before,
                    r.deaths_after,
                    r.deaths_change,
                    r.tier4_kills_before,
                    r.tier4_kills_after,
                    r.tier4_kills_change,
                    r.tier5_kills_before,
                    r.tier5_kills_after,
                    r.tier5_kills_change,
                    r.power_before,
                    r.power_after,
                    r.power_change,
                    r.total_kills_change,
                    r.required_kills,
                    r.required_deaths,
                    r.composite_score,
                    r.kills_completion_pct,
                    r.deaths_completion_pct,
                    r.rank,
                    position as i64,
                ])?;
            }
        }

        let row_count = store.len();
        tx.execute(
            "INSERT INTO leaderboard_runs (computed_at, exported_at, row_count) VALUES (?1, ?2, ?3)",
            params![
                store.meta().computed_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                row_count as i64
            ],
        )?;
        tx.commit()?;

        info!(rows = row_count, "leaderboard exported");
        Ok(row_count)
    }

    /// Exported records in their original order.
    pub fn read_all(&self) -> Result<Vec<ReconciledRecord>, ExportError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM leaderboard ORDER BY position",
            COLUMNS
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rows = records.len(), "read exported leaderboard");
        Ok(records)
    }

    pub fn latest_run(&self) -> Result<Option<ExportedRun>, ExportError> {
        let conn = self.conn.lock();
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT computed_at, exported_at, row_count FROM leaderboard_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(computed_at, exported_at, row_count)| {
            Ok(ExportedRun {
                computed_at: parse_timestamp(&computed_at)?,
                exported_at: parse_timestamp(&exported_at)?,
                row_count: row_count.max(0) as usize,
            })
        })
        .transpose()
    }
}

/// Read an exported artifact from disk.
pub fn read_exported<P: AsRef<Path>>(
    path: P,
) -> Result<(Vec<ReconciledRecord>, Option<ExportedRun>), ExportError> {
    let exporter = LeaderboardExporter::open(path)?;
    let records = exporter.read_all()?;
    let run = exporter.latest_run()?;
    Ok((records, run))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ReconciledRecord> {
    Ok(ReconciledRecord {
        participant_id: row.get(0)?,
        display_name: row.get(1)?,
        power_at_start: row.get(2)?,
        matchmaking_power: row.get(3)?,
        kill_points_before: row.get(4)?,
        kill_points_after: row.get(5)?,
        kill_points_change: row.get(6)?,
        deaths_before: row.get(7)?,
        deaths_after: row.get(8)?,
        deaths_change: row.get(9)?,
        tier4_kills_before: row.get(10)?,
        tier4_kills_after: row.get(11)?,
        tier4_kills_change: row.get(12)?,
        tier5_kills_before: row.get(13)?,
        tier5_kills_after: row.get(14)?,
        tier5_kills_change: row.get(15)?,
        power_before: row.get(16)?,
        power_after: row.get(17)?,
        power_change: row.get(18)?,
        total_kills_change: row.get(19)?,
        required_kills: row.get(20)?,
        required_deaths: row.get(21)?,
        composite_score: row.get(22)?,
        kills_completion_pct: row.get(23)?,
        deaths_completion_pct: row.get(24)?,
        rank: row.get(25)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, ExportError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ExportError::InvalidTimestamp(s.to_string()))
}
