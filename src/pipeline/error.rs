//! Error reporting for pipeline stages.

use crate::pipeline::types::Stage;
use std::fmt;

/// A stage failure as seen by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// The job continues; the failure becomes a warning on the result.
    Recoverable(String),
    /// The job stops.
    Fatal(String),
}

impl StageError {
    pub fn message(&self) -> &str {
        match self {
            StageError::Recoverable(msg) | StageError::Fatal(msg) => msg,
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a stage.
    fn report(&self, stage: Stage, error: &StageError);
}

/// Reporter that writes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: Stage, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => tracing::warn!(%stage, "{msg}"),
            StageError::Fatal(msg) => tracing::error!(%stage, "{msg}"),
        }
    }
}
