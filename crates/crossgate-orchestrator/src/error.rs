//! Orchestrator errors.

use crossgate_core::CoreError;
use thiserror::Error;

/// Errors that prevent a run from being orchestrated at all.
///
/// Job failures are not errors here; they are recorded in the run report.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Pipeline definition or state machine violation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job id was reported that the run never declared.
    #[error("Unknown job: {0}")]
    UnknownJob(String),
}
