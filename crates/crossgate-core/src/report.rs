//! Run report and result aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobKind, JobStatus, JobSummary, RunId, RunPhase};

/// How per-job results fold into one run outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationPolicy {
    /// The run succeeds iff the native job passed. Target failures are
    /// reported per job but do not fail the run.
    #[default]
    NativeOnly,
    /// The run succeeds iff the native job and every target passed.
    AllTargets,
}

/// Final report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub pipeline: String,
    pub phase: RunPhase,
    pub policy: AggregationPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Native job first, then matrix jobs in declaration order.
    pub jobs: Vec<JobSummary>,
}

impl RunReport {
    /// The native job's summary.
    pub fn native(&self) -> Option<&JobSummary> {
        self.jobs.iter().find(|j| j.job.kind == JobKind::Native)
    }

    /// Matrix job summaries.
    pub fn targets(&self) -> impl Iterator<Item = &JobSummary> {
        self.jobs.iter().filter(|j| j.job.kind != JobKind::Native)
    }

    /// Number of matrix jobs that were dispatched to a worker.
    pub fn matrix_jobs_started(&self) -> usize {
        self.targets().filter(|j| j.status.was_started()).count()
    }

    /// Matrix jobs that failed.
    pub fn failed_targets(&self) -> Vec<&JobSummary> {
        self.targets()
            .filter(|j| j.status == JobStatus::Failed)
            .collect()
    }

    /// Overall outcome under the report's policy.
    pub fn succeeded(&self) -> bool {
        let native_passed = self
            .native()
            .is_some_and(|j| j.status == JobStatus::Passed);

        match self.policy {
            AggregationPolicy::NativeOnly => native_passed,
            AggregationPolicy::AllTargets => {
                native_passed && self.targets().all(|j| j.status == JobStatus::Passed)
            }
        }
    }
}
