//! Job specifications and job results.

use crate::{JobId, JobStatus, ProvisionAction, TargetSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a job verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum JobKind {
    /// Test suite on the worker's own architecture.
    Native,
    /// Test suite cross-built for and executed under a foreign target.
    Target(TargetSpec),
}

impl JobKind {
    pub fn target(&self) -> Option<&TargetSpec> {
        match self {
            Self::Native => None,
            Self::Target(t) => Some(t),
        }
    }
}

/// One schedulable job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique job identifier.
    pub id: JobId,

    /// Display name, e.g. `full-test` or `cross-test (aarch64-musl)`.
    pub name: String,

    /// What to verify.
    pub kind: JobKind,

    /// Name of the job that must pass before this one may start.
    pub needs: Option<String>,
}

impl JobSpec {
    /// Create the native job.
    pub fn native(name: impl Into<String>) -> Self {
        Self {
            id: JobId::generate(),
            name: name.into(),
            kind: JobKind::Native,
            needs: None,
        }
    }

    /// Create one matrix entry of `template` for `target`.
    pub fn matrix_entry(template: &str, target: TargetSpec, needs: impl Into<String>) -> Self {
        Self {
            id: JobId::generate(),
            name: format!("{} ({})", template, target.short_name()),
            kind: JobKind::Target(target),
            needs: Some(needs.into()),
        }
    }
}

/// Which stage of a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Toolchain install or update failed.
    Provisioning,
    /// Cross helper could not be fetched, extracted or placed.
    HelperInstall,
    /// The test command exited unsuccessfully.
    Test,
}

/// What a worker reports back after executing a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub toolchain_version: Option<String>,
    pub provision_action: Option<ProvisionAction>,
    pub helper_version: Option<String>,
    /// Set when the job failed.
    pub failure: Option<(FailureKind, String)>,
}

impl JobOutcome {
    /// An outcome with no failure.
    pub fn passed() -> Self {
        Self::default()
    }

    /// An outcome failing with `kind`.
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            failure: Some((kind, message.into())),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of a job, carried in the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// The job this summary describes.
    pub job: JobSpec,

    /// Current status.
    pub status: JobStatus,

    /// When the job was dispatched.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,

    /// Toolchain version the job ran with.
    pub toolchain_version: Option<String>,

    /// How the toolchain was provisioned on the job's worker.
    pub provision_action: Option<ProvisionAction>,

    /// Cross helper version, for target jobs.
    pub helper_version: Option<String>,

    /// Failing stage, if the job failed.
    pub failure_kind: Option<FailureKind>,

    /// Error message if the job failed or was skipped.
    pub error_message: Option<String>,
}

impl JobSummary {
    /// Create a pending summary.
    pub fn new(job: JobSpec) -> Self {
        Self {
            job,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            toolchain_version: None,
            provision_action: None,
            helper_version: None,
            failure_kind: None,
            error_message: None,
        }
    }

    /// Mark the job as started.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the job as passed.
    pub fn pass(&mut self) {
        self.status = JobStatus::Passed;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error_message = Some(error.into());
    }

    /// Record a worker's outcome and move to `Passed` or `Failed`.
    pub fn finish(&mut self, outcome: JobOutcome) {
        self.toolchain_version = outcome.toolchain_version;
        self.provision_action = outcome.provision_action;
        self.helper_version = outcome.helper_version;

        match outcome.failure {
            None => self.pass(),
            Some((kind, message)) => {
                self.failure_kind = Some(kind);
                self.fail(message);
            }
        }
    }

    /// Mark the job as skipped without ever starting it.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Skipped;
        self.finished_at = Some(Utc::now());
        self.error_message = Some(reason.into());
    }

    /// Wall-clock duration, if the job ran to completion.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some((f - s).num_milliseconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_entry_name() {
        let target = TargetSpec::parse("aarch64-unknown-linux-gnu").unwrap();
        let job = JobSpec::matrix_entry("cross-test", target.clone(), "full-test");
        assert_eq!(job.name, "cross-test (aarch64-gnu)");
        assert_eq!(job.kind.target(), Some(&target));
        assert_eq!(job.needs.as_deref(), Some("full-test"));
    }

    #[test]
    fn test_summary_lifecycle() {
        let mut summary = JobSummary::new(JobSpec::native("full-test"));
        assert_eq!(summary.status, JobStatus::Pending);

        summary.start();
        assert!(summary.started_at.is_some());

        summary.fail("cargo test exited with code 101");
        assert_eq!(summary.status, JobStatus::Failed);
        assert!(summary.duration_ms().is_some());
    }

    #[test]
    fn test_finish_records_outcome() {
        let mut summary = JobSummary::new(JobSpec::native("full-test"));
        summary.start();
        summary.finish(JobOutcome {
            toolchain_version: Some("rustc 1.82.0".to_string()),
            provision_action: Some(ProvisionAction::Updated),
            ..JobOutcome::failed(FailureKind::Test, "cargo test exited with code 101")
        });

        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(summary.failure_kind, Some(FailureKind::Test));
        assert_eq!(summary.toolchain_version.as_deref(), Some("rustc 1.82.0"));
    }

    #[test]
    fn test_skip_never_starts() {
        let target = TargetSpec::parse("arm-unknown-linux-musleabi").unwrap();
        let mut summary = JobSummary::new(JobSpec::matrix_entry("cross-test", target, "full-test"));
        summary.skip("full-test did not pass");
        assert!(!summary.status.was_started());
        assert!(summary.started_at.is_none());
    }
}
