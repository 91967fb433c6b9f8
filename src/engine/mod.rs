//! Reconciliation, scoring and ranking.

pub mod error;
pub mod pipeline;
pub mod ranking;
pub mod reconcile;
pub mod scoring;

pub use error::{PipelineError, ReconcileError};
pub use pipeline::{
    build_records, compute_event, compute_period, run_event_pipeline, run_period_pipeline,
    EventRun, EventSources, PipelineOptions, SourceCounts,
};
pub use ranking::{assign_ranks, RankMode};
pub use reconcile::{reconcile, reconcile_period, JoinedParticipant};
pub use scoring::{completion_pct, ScoringWeights};
