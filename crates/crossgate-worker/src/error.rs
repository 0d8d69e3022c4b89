//! Error types for work done on a worker.

use crossgate_core::FailureKind;
use thiserror::Error;

/// Errors from invoking an external program.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Program not found on the search path.
    #[error("Program '{0}' not found on the search path")]
    NotFound(String),

    /// Failed to spawn or wait for the process.
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from downloading an artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed or returned an error status.
    #[error("HTTP error fetching '{url}': {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Failed to write the downloaded artifact.
    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a job.
///
/// None of these are retried.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Toolchain install or update failed.
    #[error("Toolchain provisioning failed: {0}")]
    Provisioning(String),

    /// Cross helper could not be installed.
    #[error("Cross helper install failed: {0}")]
    HelperInstall(String),

    /// Test command exited unsuccessfully.
    #[error("'{command}' exited with code {exit_code:?}")]
    TestFailure {
        command: String,
        exit_code: Option<i32>,
    },

    /// Test command could not be started.
    #[error(transparent)]
    Command(#[from] RunnerError),
}

impl WorkerError {
    /// Stage of the job this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Provisioning(_) => FailureKind::Provisioning,
            Self::HelperInstall(_) => FailureKind::HelperInstall,
            Self::TestFailure { .. } | Self::Command(_) => FailureKind::Test,
        }
    }
}
