//! Metric deltas, composite score (DKP) and requirement completion.

use serde::{Deserialize, Serialize};

use crate::models::ReconciledRecord;

use super::reconcile::JoinedParticipant;

/// Integer weights applied to signed deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub deaths: i64,
    pub tier5_kills: i64,
    pub tier4_kills: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            deaths: 15,
            tier5_kills: 10,
            tier4_kills: 4,
        }
    }
}

impl ScoringWeights {
    /// Saturates at the `i64` bounds instead of wrapping.
    pub fn composite(&self, deaths_change: i64, tier5_change: i64, tier4_change: i64) -> i64 {
        deaths_change
            .saturating_mul(self.deaths)
            .saturating_add(tier5_change.saturating_mul(self.tier5_kills))
            .saturating_add(tier4_change.saturating_mul(self.tier4_kills))
    }
}

/// `done / required * 100`. A zero requirement counts as fully satisfied,
/// whatever the sign of `done`.
pub fn completion_pct(done: i64, required: i64) -> f64 {
    if required == 0 {
        return 100.0;
    }
    done as f64 / required as f64 * 100.0
}

/// Build the scored record for one joined participant. Rank is left at 0.
pub fn score(joined: JoinedParticipant, weights: &ScoringWeights) -> ReconciledRecord {
    let JoinedParticipant {
        participant_id,
        display_name,
        power_at_start,
        before,
        after,
        required_kills,
        required_deaths,
    } = joined;

    let kill_points_change = after.kill_points.saturating_sub(before.kill_points);
    let deaths_change = after.deaths.saturating_sub(before.deaths);
    let tier4_kills_change = after.tier4_kills.saturating_sub(before.tier4_kills);
    let tier5_kills_change = after.tier5_kills.saturating_sub(before.tier5_kills);
    let power_change = after.power.saturating_sub(before.power);
    let total_kills_change = tier4_kills_change.saturating_add(tier5_kills_change);

    ReconciledRecord {
        participant_id,
        display_name,
        power_at_start,
        matchmaking_power: after.power,

        kill_points_before: before.kill_points,
        kill_points_after: after.kill_points,
        kill_points_change,

        deaths_before: before.deaths,
        deaths_after: after.deaths,
        deaths_change,

        tier4_kills_before: before.tier4_kills,
        tier4_kills_after: after.tier4_kills,
        tier4_kills_change,

        tier5_kills_before: before.tier5_kills,
        tier5_kills_after: after.tier5_kills,
        tier5_kills_change,

        power_before: before.power,
        power_after: after.power,
        power_change,

        total_kills_change,
        required_kills,
        required_deaths,

        composite_score: weights.composite(deaths_change, tier5_kills_change, tier4_kills_change),
        kills_completion_pct: completion_pct(total_kills_change, required_kills),
        deaths_completion_pct: completion_pct(deaths_change, required_deaths),
        rank: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantSnapshotRow;

    fn snapshot(kp: i64, deaths: i64, t4: i64, t5: i64, power: i64) -> ParticipantSnapshotRow {
        ParticipantSnapshotRow {
            participant_id: "P1".into(),
            display_name: None,
            power,
            kill_points: kp,
            deaths,
            tier4_kills: t4,
            tier5_kills: t5,
        }
    }

    fn joined(before: ParticipantSnapshotRow, after: ParticipantSnapshotRow, rk: i64, rd: i64) -> JoinedParticipant {
        JoinedParticipant {
            participant_id: "P1".into(),
            display_name: "One".into(),
            power_at_start: 900,
            before,
            after,
            required_kills: rk,
            required_deaths: rd,
        }
    }

    #[test]
    fn test_scenario_a_deltas_and_dkp() {
        let rec = score(
            joined(snapshot(100, 10, 5, 1, 1000), snapshot(150, 12, 6, 2, 1100), 10, 5),
            &ScoringWeights::default(),
        );
        assert_eq!(rec.kill_points_change, 50);
        assert_eq!(rec.deaths_change, 2);
        assert_eq!(rec.tier4_kills_change, 1);
        assert_eq!(rec.tier5_kills_change, 1);
        assert_eq!(rec.power_change, 100);
        assert_eq!(rec.composite_score, 44);
        assert_eq!(rec.matchmaking_power, 1100);
        assert_eq!(rec.power_at_start, 900);
        assert!((rec.kills_completion_pct - 20.0).abs() < 1e-9);
        assert!((rec.deaths_completion_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_deltas_lower_score() {
        let rec = score(
            joined(snapshot(0, 10, 5, 5, 0), snapshot(0, 9, 5, 5, 0), 0, 0),
            &ScoringWeights::default(),
        );
        assert_eq!(rec.composite_score, -15);
    }

    #[test]
    fn test_zero_requirement_is_complete() {
        assert_eq!(completion_pct(0, 0), 100.0);
        assert_eq!(completion_pct(-30, 0), 100.0);
        assert_eq!(completion_pct(250, 100), 250.0);
    }

    #[test]
    fn test_custom_weights() {
        let weights = ScoringWeights {
            deaths: 1,
            tier5_kills: 2,
            tier4_kills: 3,
        };
        assert_eq!(weights.composite(1, 1, 1), 6);
    }

    #[test]
    fn test_extreme_deltas_saturate() {
        let rec = score(
            joined(
                snapshot(i64::MIN, 0, 0, -5, 0),
                snapshot(i64::MAX, 700_000_000_000_000_000, i64::MAX, i64::MAX, 0),
                0,
                0,
            ),
            &ScoringWeights::default(),
        );
        assert_eq!(rec.deaths_change, 700_000_000_000_000_000);
        assert_eq!(rec.kill_points_change, i64::MAX);
        assert_eq!(rec.tier5_kills_change, i64::MAX);
        assert_eq!(rec.total_kills_change, i64::MAX);
        assert_eq!(rec.composite_score, i64::MAX);

        let falling = score(
            joined(snapshot(0, 700_000_000_000_000_000, 0, 0, 0), snapshot(0, 0, 0, 0, 0), 0, 0),
            &ScoringWeights::default(),
        );
        assert_eq!(falling.composite_score, i64::MIN);
    }
}
