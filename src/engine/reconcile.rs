//! Identity Reconciler
//!
//! Joins roster, before and after snapshots on participant id. The three
//! mandatory sources are intersected: a participant missing from any of them
//! is dropped. Requirements are joined left-outer and default to 0.

use std::collections::HashMap;

use tracing::info;

use crate::models::{ParticipantSnapshotRow, UNKNOWN_PARTICIPANT_NAME};
use crate::snapshots::{RequirementsTable, SnapshotTable};

use super::error::ReconcileError;

/// One participant present in all three mandatory sources.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedParticipant {
    pub participant_id: String,
    pub display_name: String,
    pub power_at_start: i64,
    pub before: ParticipantSnapshotRow,
    pub after: ParticipantSnapshotRow,
    pub required_kills: i64,
    pub required_deaths: i64,
}

/// Where a participant's display name is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePolicy {
    /// After snapshot only
    AfterOnly,
    /// After snapshot, then the before snapshot
    AfterThenBefore,
}

/// Join the whole-event sources.
///
/// Output follows roster order so tie-breaking downstream is deterministic.
pub fn reconcile(
    roster: &SnapshotTable,
    before: &SnapshotTable,
    after: &SnapshotTable,
    requirements: Option<&RequirementsTable>,
) -> Result<Vec<JoinedParticipant>, ReconcileError> {
    join(roster, before, after, requirements, NamePolicy::AfterOnly)
}

/// Join a period's start/end snapshots, bounded by the roster.
///
/// Period tables carry no requirements.
pub fn reconcile_period(
    roster: &SnapshotTable,
    start: &SnapshotTable,
    end: &SnapshotTable,
) -> Result<Vec<JoinedParticipant>, ReconcileError> {
    join(roster, start, end, None, NamePolicy::AfterThenBefore)
}

fn join(
    roster: &SnapshotTable,
    before: &SnapshotTable,
    after: &SnapshotTable,
    requirements: Option<&RequirementsTable>,
    names: NamePolicy,
) -> Result<Vec<JoinedParticipant>, ReconcileError> {
    let before_by_id = index(before);
    let after_by_id = index(after);

    let joined: Vec<JoinedParticipant> = roster
        .rows
        .iter()
        .filter_map(|r| {
            let b = before_by_id.get(r.participant_id.as_str())?;
            let a = after_by_id.get(r.participant_id.as_str())?;
            let (required_kills, required_deaths) = requirements
                .and_then(|reqs| reqs.get(&r.participant_id))
                .map(|spec| (spec.required_kills, spec.required_deaths))
                .unwrap_or((0, 0));

            let display_name = match names {
                NamePolicy::AfterOnly => a.display_name.clone(),
                NamePolicy::AfterThenBefore => {
                    a.display_name.clone().or_else(|| b.display_name.clone())
                }
            }
            .unwrap_or_else(|| UNKNOWN_PARTICIPANT_NAME.to_string());

            Some(JoinedParticipant {
                participant_id: r.participant_id.clone(),
                display_name,
                power_at_start: r.power,
                before: (*b).clone(),
                after: (*a).clone(),
                required_kills,
                required_deaths,
            })
        })
        .collect();

    info!(
        roster = roster.len(),
        before = before.len(),
        after = after.len(),
        joined = joined.len(),
        "reconciled {} + {} sources",
        before.kind,
        after.kind
    );

    if joined.is_empty() {
        return Err(ReconcileError::EmptyResult {
            roster: roster.len(),
            before: before.len(),
            after: after.len(),
        });
    }
    Ok(joined)
}

fn index(table: &SnapshotTable) -> HashMap<&str, &ParticipantSnapshotRow> {
    table
        .rows
        .iter()
        .map(|r| (r.participant_id.as_str(), r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequirementSpec;
    use crate::snapshots::SourceKind;

    fn row(id: &str, name: Option<&str>, kp: i64) -> ParticipantSnapshotRow {
        ParticipantSnapshotRow {
            participant_id: id.into(),
            display_name: name.map(str::to_string),
            kill_points: kp,
            ..Default::default()
        }
    }

    fn table(kind: SourceKind, rows: Vec<ParticipantSnapshotRow>) -> SnapshotTable {
        SnapshotTable::new(kind, rows)
    }

    #[test]
    fn test_intersection_of_three_sources() {
        let roster = table(
            SourceKind::Roster,
            vec![row("P1", None, 0), row("P2", None, 0), row("P3", None, 0)],
        );
        let before = table(
            SourceKind::Before,
            vec![row("P1", None, 100), row("P2", None, 5), row("P4", None, 1)],
        );
        let after = table(
            SourceKind::After,
            vec![row("P1", Some("One"), 150), row("P3", Some("Three"), 9), row("P4", Some("Four"), 2)],
        );

        let joined = reconcile(&roster, &before, &after, None).unwrap();
        let ids: Vec<_> = joined.iter().map(|j| j.participant_id.as_str()).collect();
        assert_eq!(ids, vec!["P1"]);
        assert_eq!(joined[0].before.kill_points, 100);
        assert_eq!(joined[0].after.kill_points, 150);
        assert_eq!(joined[0].display_name, "One");
    }

    #[test]
    fn test_requirements_left_join_defaults_to_zero() {
        let roster = table(SourceKind::Roster, vec![row("P1", None, 0), row("P2", None, 0)]);
        let before = table(SourceKind::Before, vec![row("P1", None, 0), row("P2", None, 0)]);
        let after = table(SourceKind::After, vec![row("P1", None, 0), row("P2", None, 0)]);
        let reqs = RequirementsTable::from_rows(vec![RequirementSpec {
            participant_id: "P1".into(),
            required_kills: 10,
            required_deaths: 5,
        }]);

        let joined = reconcile(&roster, &before, &after, Some(&reqs)).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!((joined[0].required_kills, joined[0].required_deaths), (10, 5));
        assert_eq!((joined[1].required_kills, joined[1].required_deaths), (0, 0));
        assert_eq!(joined[1].display_name, UNKNOWN_PARTICIPANT_NAME);
    }

    #[test]
    fn test_disjoint_ids_is_empty_result() {
        let roster = table(SourceKind::Roster, vec![row("A", None, 0)]);
        let before = table(SourceKind::Before, vec![row("B", None, 0)]);
        let after = table(SourceKind::After, vec![row("A", None, 0)]);

        let err = reconcile(&roster, &before, &after, None).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::EmptyResult {
                roster: 1,
                before: 1,
                after: 1
            }
        );
    }

    #[test]
    fn test_period_name_falls_back_to_start_snapshot() {
        let roster = table(SourceKind::Roster, vec![row("P1", None, 0)]);
        let start = table(SourceKind::PeriodStart, vec![row("P1", Some("Old Name"), 0)]);
        let end = table(SourceKind::PeriodEnd, vec![row("P1", None, 0)]);

        let joined = reconcile_period(&roster, &start, &end).unwrap();
        assert_eq!(joined[0].display_name, "Old Name");
        assert_eq!(joined[0].required_kills, 0);
    }
}
