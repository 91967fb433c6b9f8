use std::path::PathBuf;
use std::time::Duration;

use super::SourceKind;

/// Failures while turning a snapshot source into typed rows.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Mandatory source file does not exist
    MissingSource { source: SourceKind, path: PathBuf },
    /// Source exists but holds no data rows
    EmptyDataset { source: SourceKind, path: PathBuf },
    /// A required column is absent after alias resolution
    MissingColumn {
        source: SourceKind,
        path: PathBuf,
        column: &'static str,
    },
    /// File could not be read or parsed as a table
    Unreadable {
        source: SourceKind,
        path: PathBuf,
        reason: String,
    },
    /// Strict mode only: a numeric cell that is not a number
    InvalidValue {
        source: SourceKind,
        path: PathBuf,
        row: usize,
        column: &'static str,
        value: String,
    },
    TimedOut {
        source: SourceKind,
        path: PathBuf,
        after: Duration,
    },
}

impl LoadError {
    /// Short machine-readable tag, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSource { .. } => "missing_source",
            Self::EmptyDataset { .. } => "empty_dataset",
            Self::MissingColumn { .. } => "missing_column",
            Self::Unreadable { .. } => "unreadable_source",
            Self::InvalidValue { .. } => "invalid_value",
            Self::TimedOut { .. } => "load_timeout",
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSource { source, path } => {
                write!(f, "{} source not found at {}", source, path.display())
            }
            Self::EmptyDataset { source, path } => {
                write!(f, "{} source {} has no rows", source, path.display())
            }
            Self::MissingColumn {
                source,
                path,
                column,
            } => write!(
                f,
                "{} source {} is missing required column '{}'",
                source,
                path.display(),
                column
            ),
            Self::Unreadable {
                source,
                path,
                reason,
            } => write!(
                f,
                "failed to read {} source {}: {}",
                source,
                path.display(),
                reason
            ),
            Self::InvalidValue {
                source,
                path,
                row,
                column,
                value,
            } => write!(
                f,
                "{} source {} row {}: '{}' is not a number in column '{}'",
                source,
                path.display(),
                row,
                value,
                column
            ),
            Self::TimedOut {
                source,
                path,
                after,
            } => write!(
                f,
                "loading {} source {} timed out after {:?}",
                source,
                path.display(),
                after
            ),
        }
    }
}

impl std::error::Error for LoadError {}
