//! Leaderboard Store
//!
//! An immutable, query-only view over one computation's records. A new
//! computation builds a new store; nothing here is mutated after `new`.

pub mod export;

pub use export::{read_exported, ExportError, ExportedRun, LeaderboardExporter};

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::SourceCounts;
use crate::models::ReconciledRecord;

/// Column a top-N list is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMetric {
    #[default]
    CompositeScore,
    KillsChange,
    DeathsChange,
    PowerChange,
    Tier4KillsChange,
    Tier5KillsChange,
}

impl RankMetric {
    pub const ALL: [RankMetric; 6] = [
        RankMetric::CompositeScore,
        RankMetric::KillsChange,
        RankMetric::DeathsChange,
        RankMetric::PowerChange,
        RankMetric::Tier4KillsChange,
        RankMetric::Tier5KillsChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankMetric::CompositeScore => "composite_score",
            RankMetric::KillsChange => "kills_change",
            RankMetric::DeathsChange => "deaths_change",
            RankMetric::PowerChange => "power_change",
            RankMetric::Tier4KillsChange => "tier4_kills_change",
            RankMetric::Tier5KillsChange => "tier5_kills_change",
        }
    }

    pub fn value(&self, record: &ReconciledRecord) -> i64 {
        match self {
            RankMetric::CompositeScore => record.composite_score,
            RankMetric::KillsChange => record.kill_points_change,
            RankMetric::DeathsChange => record.deaths_change,
            RankMetric::PowerChange => record.power_change,
            RankMetric::Tier4KillsChange => record.tier4_kills_change,
            RankMetric::Tier5KillsChange => record.tier5_kills_change,
        }
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted || (wanted == "dkp" && *m == RankMetric::CompositeScore))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown metric '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

impl std::fmt::Display for RankMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain sums over a reconciled set, saturating at the `i64` bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTotals {
    pub participants: usize,
    pub total_kills_change: i64,
    pub total_deaths_change: i64,
    pub total_power_change: i64,
    /// Sum of `power_after`
    pub total_power_current: i64,
    pub total_tier4_kills_change: i64,
    pub total_tier5_kills_change: i64,
    pub total_composite_score: i64,
}

/// Participant still short of a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutstandingEntry {
    pub participant_id: String,
    pub display_name: String,
    pub kills_needed: i64,
    pub deaths_needed: i64,
    pub kills_done: i64,
    pub deaths_done: i64,
    pub kills_completion_pct: f64,
    pub deaths_completion_pct: f64,
}

impl From<&ReconciledRecord> for OutstandingEntry {
    fn from(r: &ReconciledRecord) -> Self {
        Self {
            participant_id: r.participant_id.clone(),
            display_name: r.display_name.clone(),
            kills_needed: r.kills_needed(),
            deaths_needed: r.deaths_needed(),
            kills_done: r.kill_points_change,
            deaths_done: r.deaths_change,
            kills_completion_pct: r.kills_completion_pct,
            deaths_completion_pct: r.deaths_completion_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardMeta {
    pub computed_at: DateTime<Utc>,
    pub sources: SourceCounts,
}

impl LeaderboardMeta {
    pub fn now(sources: SourceCounts) -> Self {
        Self {
            computed_at: Utc::now(),
            sources,
        }
    }
}

/// Materialized result of one computation.
#[derive(Debug, Clone)]
pub struct LeaderboardStore {
    records: Vec<ReconciledRecord>,
    by_id: HashMap<String, usize>,
    meta: LeaderboardMeta,
}

impl LeaderboardStore {
    /// `records` are kept in the given (reconciliation) order.
    pub fn new(records: Vec<ReconciledRecord>, meta: LeaderboardMeta) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.participant_id.clone(), i))
            .collect();
        Self {
            records,
            by_id,
            meta,
        }
    }

    pub fn records(&self) -> &[ReconciledRecord] {
        &self.records
    }

    pub fn meta(&self) -> &LeaderboardMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact match on the canonical id (surrounding whitespace ignored).
    pub fn get_by_id(&self, participant_id: &str) -> Option<&ReconciledRecord> {
        self.by_id
            .get(participant_id.trim())
            .and_then(|&i| self.records.get(i))
    }

    /// Top `n` by `by`, descending. Ties keep reconciliation order.
    pub fn get_top_n(&self, n: usize, by: RankMetric) -> Vec<&ReconciledRecord> {
        let mut sorted: Vec<&ReconciledRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| by.value(b).cmp(&by.value(a)));
        sorted.truncate(n);
        sorted
    }

    /// Pages of participants with outstanding requirements.
    ///
    /// Lazy and finite; call again to restart from the first page.
    pub fn get_outstanding(&self, page_size: usize) -> OutstandingPages<'_> {
        OutstandingPages {
            remaining: self.records.iter(),
            page_size: page_size.max(1),
        }
    }

    /// One page (0-based) of `get_outstanding`, empty past the end.
    pub fn outstanding_page(&self, page_size: usize, page: usize) -> Vec<OutstandingEntry> {
        let page_size = page_size.max(1);
        self.outstanding()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .map(OutstandingEntry::from)
            .collect()
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding().count()
    }

    pub fn outstanding_page_count(&self, page_size: usize) -> usize {
        self.outstanding_count().div_ceil(page_size.max(1))
    }

    fn outstanding(&self) -> impl Iterator<Item = &ReconciledRecord> {
        self.records.iter().filter(|r| r.has_outstanding_requirements())
    }

    pub fn get_aggregate_totals(&self) -> AggregateTotals {
        aggregate_totals(&self.records)
    }
}

/// Iterator returned by [`LeaderboardStore::get_outstanding`].
pub struct OutstandingPages<'a> {
    remaining: std::slice::Iter<'a, ReconciledRecord>,
    page_size: usize,
}

impl Iterator for OutstandingPages<'_> {
    type Item = Vec<OutstandingEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let page: Vec<OutstandingEntry> = self
            .remaining
            .by_ref()
            .filter(|r| r.has_outstanding_requirements())
            .take(self.page_size)
            .map(OutstandingEntry::from)
            .collect();
        (!page.is_empty()).then_some(page)
    }
}

pub fn aggregate_totals(records: &[ReconciledRecord]) -> AggregateTotals {
    records
        .iter()
        .fold(AggregateTotals::default(), |mut acc, r| {
            acc.participants += 1;
            acc.total_kills_change = acc.total_kills_change.saturating_add(r.kill_points_change);
            acc.total_deaths_change = acc.total_deaths_change.saturating_add(r.deaths_change);
            acc.total_power_change = acc.total_power_change.saturating_add(r.power_change);
            acc.total_power_current = acc.total_power_current.saturating_add(r.power_after);
            acc.total_tier4_kills_change =
                acc.total_tier4_kills_change.saturating_add(r.tier4_kills_change);
            acc.total_tier5_kills_change =
                acc.total_tier5_kills_change.saturating_add(r.tier5_kills_change);
            acc.total_composite_score = acc.total_composite_score.saturating_add(r.composite_score);
            acc
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(id: &str, score: i64, kp_change: i64, required_kills: i64) -> ReconciledRecord {
        ReconciledRecord {
            participant_id: id.into(),
            display_name: format!("Gov {}", id),
            power_at_start: 1_000,
            matchmaking_power: 1_100,
            kill_points_before: 0,
            kill_points_after: kp_change,
            kill_points_change: kp_change,
            deaths_before: 0,
            deaths_after: 1,
            deaths_change: 1,
            tier4_kills_before: 0,
            tier4_kills_after: 2,
            tier4_kills_change: 2,
            tier5_kills_before: 0,
            tier5_kills_after: 3,
            tier5_kills_change: 3,
            power_before: 1_000,
            power_after: 1_100,
            power_change: 100,
            total_kills_change: 5,
            required_kills,
            required_deaths: 0,
            composite_score: score,
            kills_completion_pct: 0.0,
            deaths_completion_pct: 100.0,
            rank: 0,
        }
    }

    fn store(records: Vec<ReconciledRecord>) -> LeaderboardStore {
        LeaderboardStore::new(records, LeaderboardMeta::now(SourceCounts::default()))
    }

    #[test]
    fn test_get_by_id() {
        let s = store(vec![record("101", 10, 0, 0), record("102", 20, 0, 0)]);
        assert_eq!(s.get_by_id("102").map(|r| r.composite_score), Some(20));
        assert_eq!(s.get_by_id(" 101 ").map(|r| r.composite_score), Some(10));
        assert!(s.get_by_id("999").is_none());
    }

    #[test]
    fn test_top_n_stable_on_ties() {
        let s = store(vec![
            record("A", 44, 5, 0),
            record("B", 50, 1, 0),
            record("C", 44, 9, 0),
        ]);
        let ids: Vec<&str> = s
            .get_top_n(10, RankMetric::CompositeScore)
            .iter()
            .map(|r| r.participant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["B", "A", "C"]);

        let by_kills: Vec<&str> = s
            .get_top_n(2, RankMetric::KillsChange)
            .iter()
            .map(|r| r.participant_id.as_str())
            .collect();
        assert_eq!(by_kills, vec!["C", "A"]);
    }

    #[test]
    fn test_outstanding_pages_are_lazy_and_restartable() {
        let s = store(vec![
            record("1", 0, 5, 10),
            record("2", 0, 20, 10),
            record("3", 0, 0, 1),
            record("4", 0, 0, 0),
            record("5", 0, -3, 2),
        ]);

        let pages: Vec<Vec<OutstandingEntry>> = s.get_outstanding(2).collect();
        assert_eq!(pages.len(), 2);
        let ids: Vec<&str> = pages
            .iter()
            .flatten()
            .map(|e| e.participant_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3", "5"]);
        assert_eq!(pages[0][0].kills_needed, 5);
        assert_eq!(pages[1][0].kills_needed, 5);

        // restart yields the same sequence
        assert_eq!(s.get_outstanding(2).collect::<Vec<_>>(), pages);
        assert_eq!(s.outstanding_page(2, 1), pages[1]);
        assert!(s.outstanding_page(2, 5).is_empty());
        assert_eq!(s.outstanding_page_count(2), 2);
    }

    #[test]
    fn test_zero_page_size_is_one() {
        let s = store(vec![record("1", 0, 0, 10)]);
        assert_eq!(s.get_outstanding(0).count(), 1);
    }

    #[test]
    fn test_aggregate_totals() {
        let s = store(vec![record("1", 10, 5, 0), record("2", 20, 7, 0)]);
        let totals = s.get_aggregate_totals();
        assert_eq!(totals.participants, 2);
        assert_eq!(totals.total_kills_change, 12);
        assert_eq!(totals.total_deaths_change, 2);
        assert_eq!(totals.total_power_change, 200);
        assert_eq!(totals.total_power_current, 2_200);
        assert_eq!(totals.total_composite_score, 30);
    }

    #[test]
    fn test_aggregate_totals_saturate() {
        let s = store(vec![
            record("1", i64::MAX, i64::MAX, 0),
            record("2", 20, 7, 0),
        ]);
        let totals = s.get_aggregate_totals();
        assert_eq!(totals.total_composite_score, i64::MAX);
        assert_eq!(totals.total_kills_change, i64::MAX);
        assert_eq!(totals.total_power_current, 2_200);
    }

    #[test]
    fn test_rank_metric_parse() {
        assert_eq!("kills-change".parse::<RankMetric>(), Ok(RankMetric::KillsChange));
        assert_eq!("DKP".parse::<RankMetric>(), Ok(RankMetric::CompositeScore));
        assert!("bogus".parse::<RankMetric>().is_err());
    }
}
