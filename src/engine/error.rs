use crate::snapshots::LoadError;

/// The join produced nothing.
///
/// Usually a configuration problem (disjoint id sets, wrong files), reported
/// separately from "nobody qualifies yet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    EmptyResult {
        roster: usize,
        before: usize,
        after: usize,
    },
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyResult {
                roster,
                before,
                after,
            } => write!(
                f,
                "no participant is present in roster ({} rows), before ({} rows) and after ({} rows)",
                roster, before, after
            ),
        }
    }
}

impl std::error::Error for ReconcileError {}

/// Failure of a full computation run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Load(LoadError),
    Reconcile(ReconcileError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load(e) => e.kind(),
            Self::Reconcile(_) => "empty_result",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(e) => write!(f, "load failed: {}", e),
            Self::Reconcile(e) => write!(f, "reconciliation failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Reconcile(e) => Some(e),
        }
    }
}

impl From<LoadError> for PipelineError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<ReconcileError> for PipelineError {
    fn from(e: ReconcileError) -> Self {
        Self::Reconcile(e)
    }
}
