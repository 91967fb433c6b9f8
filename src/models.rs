use serde::{Deserialize, Serialize};

/// Display name used when a snapshot carries no name for a participant.
pub const UNKNOWN_PARTICIPANT_NAME: &str = "Unknown Governor";

/// One participant captured in one snapshot.
///
/// Produced by the snapshot loader after alias resolution and numeric
/// coercion, so every metric is already a plain integer (missing cells are 0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSnapshotRow {
    pub participant_id: String,
    pub display_name: Option<String>,
    pub power: i64,
    pub kill_points: i64,
    pub deaths: i64,
    pub tier4_kills: i64,
    pub tier5_kills: i64,
}

/// Per-participant targets for the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub participant_id: String,
    pub required_kills: i64,
    pub required_deaths: i64,
}

/// A participant after roster, before, after (and requirements) were joined
/// and scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub participant_id: String,
    pub display_name: String,

    /// Power from the starting roster snapshot
    pub power_at_start: i64,
    /// Power the participant is matched with (the after snapshot)
    pub matchmaking_power: i64,

    pub kill_points_before: i64,
    pub kill_points_after: i64,
    pub kill_points_change: i64,

    pub deaths_before: i64,
    pub deaths_after: i64,
    pub deaths_change: i64,

    pub tier4_kills_before: i64,
    pub tier4_kills_after: i64,
    pub tier4_kills_change: i64,

    pub tier5_kills_before: i64,
    pub tier5_kills_after: i64,
    pub tier5_kills_change: i64,

    pub power_before: i64,
    pub power_after: i64,
    pub power_change: i64,

    /// T4 + T5 kills gained
    pub total_kills_change: i64,

    pub required_kills: i64,
    pub required_deaths: i64,

    /// DKP
    pub composite_score: i64,
    /// Unclamped; over-completion produces values above 100
    pub kills_completion_pct: f64,
    pub deaths_completion_pct: f64,

    pub rank: u32,
}

impl ReconciledRecord {
    /// Kills still missing against the requirement, never negative.
    pub fn kills_needed(&self) -> i64 {
        self.required_kills.saturating_sub(self.kill_points_change).max(0)
    }

    /// Deaths still missing against the requirement, never negative.
    pub fn deaths_needed(&self) -> i64 {
        self.required_deaths.saturating_sub(self.deaths_change).max(0)
    }

    pub fn has_outstanding_requirements(&self) -> bool {
        self.kills_needed() > 0 || self.deaths_needed() > 0
    }

    /// Arguments handed to the progress-chart renderer.
    pub fn chart_input(&self) -> ChartInput {
        ChartInput {
            kills_completion_pct: self.kills_completion_pct,
            deaths_completion_pct: self.deaths_completion_pct,
            name: self.display_name.clone(),
            required_kills: self.required_kills,
            current_kills: self.total_kills_change,
            required_deaths: self.required_deaths,
            current_deaths: self.deaths_change,
        }
    }
}

/// Input contract of the external chart renderer.
///
/// Percentages are passed through unclamped; the renderer caps bars at 100%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInput {
    pub kills_completion_pct: f64,
    pub deaths_completion_pct: f64,
    pub name: String,
    pub required_kills: i64,
    pub current_kills: i64,
    pub required_deaths: i64,
    pub current_deaths: i64,
}
