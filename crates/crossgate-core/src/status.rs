//! Status enums for runs, jobs and toolchains.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// Phase of a pipeline run.
///
/// ```text
/// Pending -> NativeRunning -> NativeFailed (terminal)
///                          -> NativePassed -> MatrixRunning -> Completed
/// ```
///
/// The only way into `MatrixRunning` is through `NativePassed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Run accepted, nothing dispatched yet.
    #[default]
    Pending,
    /// Native job dispatched.
    NativeRunning,
    /// Native job failed; the matrix is never attempted.
    NativeFailed,
    /// Native job passed; the matrix gate is open.
    NativePassed,
    /// Matrix jobs dispatched.
    MatrixRunning,
    /// Every matrix job reached a terminal status.
    Completed,
}

impl RunPhase {
    /// Returns true if the run will not make further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NativeFailed | Self::Completed)
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    pub fn transition(self, next: RunPhase) -> Result<RunPhase, CoreError> {
        let allowed = matches!(
            (self, next),
            (Self::Pending, Self::NativeRunning)
                | (Self::NativeRunning, Self::NativePassed)
                | (Self::NativeRunning, Self::NativeFailed)
                | (Self::NativePassed, Self::MatrixRunning)
                | (Self::MatrixRunning, Self::Completed)
        );

        if allowed {
            Ok(next)
        } else {
            Err(CoreError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::NativeRunning => "NATIVE_RUNNING",
            Self::NativeFailed => "NATIVE_FAILED",
            Self::NativePassed => "NATIVE_PASSED",
            Self::MatrixRunning => "MATRIX_RUNNING",
            Self::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// Status of a single job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job declared but not dispatched.
    #[default]
    Pending,
    /// Job running on a worker.
    Running,
    /// Every step succeeded.
    Passed,
    /// A step failed.
    Failed,
    /// Never dispatched because its dependency did not pass.
    Skipped,
}

impl JobStatus {
    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }

    /// Returns true if the job actually started on a worker.
    pub fn was_started(&self) -> bool {
        matches!(self, Self::Running | Self::Passed | Self::Failed)
    }
}

/// Presence of a compiler toolchain on a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ToolchainState {
    /// No toolchain manager found on the search path.
    #[default]
    Absent,
    /// Toolchain usable; `version` is the compiler's version line.
    Present { version: String },
}

impl ToolchainState {
    /// Returns the installed version, if any.
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Absent => None,
            Self::Present { version } => Some(version),
        }
    }
}

/// Which transition a provisioning call performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionAction {
    /// Absent -> Present.
    FreshInstall,
    /// Present -> Present, updated in place.
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let phase = RunPhase::Pending
            .transition(RunPhase::NativeRunning)
            .and_then(|p| p.transition(RunPhase::NativePassed))
            .and_then(|p| p.transition(RunPhase::MatrixRunning))
            .and_then(|p| p.transition(RunPhase::Completed))
            .unwrap();
        assert_eq!(phase, RunPhase::Completed);
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_matrix_requires_native_pass() {
        let err = RunPhase::NativeFailed
            .transition(RunPhase::MatrixRunning)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));

        assert!(RunPhase::NativeRunning
            .transition(RunPhase::MatrixRunning)
            .is_err());
        assert!(RunPhase::Pending.transition(RunPhase::MatrixRunning).is_err());
    }

    #[test]
    fn test_job_status_started() {
        assert!(!JobStatus::Skipped.was_started());
        assert!(!JobStatus::Pending.was_started());
        assert!(JobStatus::Failed.was_started());
        assert!(JobStatus::Skipped.is_terminal());
    }
}
