use serde::{Deserialize, Serialize};

use crate::models::ReconciledRecord;

/// How tied composite scores translate into rank numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    /// 50, 44, 44, 40 -> 1, 2, 2, 3
    #[default]
    Dense,
    /// 50, 44, 44, 40 -> 1, 2, 2, 4
    Competition,
}

/// Assign ranks in place, descending by composite score.
///
/// Record order is left untouched; only `rank` is written.
pub fn assign_ranks(records: &mut [ReconciledRecord], mode: RankMode) {
    let mut scores: Vec<i64> = records.iter().map(|r| r.composite_score).collect();
    scores.sort_unstable_by(|a, b| b.cmp(a));
    if mode == RankMode::Dense {
        scores.dedup();
    }

    // dense counts distinct scores above, competition counts all of them
    for record in records.iter_mut() {
        let higher = scores.partition_point(|s| *s > record.composite_score);
        record.rank = higher as u32 + 1;
    }
}
