//! Shared state of one pipeline run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crossgate_core::{
    AggregationPolicy, JobId, JobOutcome, JobSpec, JobStatus, JobSummary, PipelineEvent, RunId,
    RunPhase, RunReport,
};

use crate::error::OrchestratorError;

/// State of a run in progress.
///
/// Jobs are kept in declaration order: the native job first, then the
/// matrix entries in the order the pipeline lists their targets.
pub struct RunState {
    /// Run identifier.
    pub run_id: RunId,

    /// Pipeline name.
    pub pipeline: String,

    /// How the final verdict is computed.
    pub policy: AggregationPolicy,

    /// When the run was accepted.
    pub started_at: DateTime<Utc>,

    phase: RwLock<RunPhase>,
    jobs: RwLock<Vec<JobSummary>>,
    events: RwLock<Vec<PipelineEvent>>,
    finished_at: RwLock<Option<DateTime<Utc>>>,
}

impl RunState {
    /// Create a new RunState wrapped in Arc.
    pub fn new(pipeline: impl Into<String>, policy: AggregationPolicy) -> Arc<Self> {
        Arc::new(Self {
            run_id: RunId::generate(),
            pipeline: pipeline.into(),
            policy,
            started_at: Utc::now(),
            phase: RwLock::new(RunPhase::Pending),
            jobs: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            finished_at: RwLock::new(None),
        })
    }

    pub async fn phase(&self) -> RunPhase {
        *self.phase.read().await
    }

    /// Advance the run phase.
    pub async fn advance(&self, next: RunPhase) -> Result<RunPhase, OrchestratorError> {
        let mut phase = self.phase.write().await;
        *phase = phase.transition(next)?;
        if phase.is_terminal() {
            *self.finished_at.write().await = Some(Utc::now());
        }
        Ok(*phase)
    }

    /// Declare a job as part of this run.
    pub async fn declare(&self, job: JobSpec) {
        self.jobs.write().await.push(JobSummary::new(job));
    }

    pub async fn mark_running(&self, job_id: &JobId) -> Result<(), OrchestratorError> {
        self.update(job_id, |summary| summary.start()).await
    }

    /// Record a finished job. Returns the updated summary.
    pub async fn record_outcome(
        &self,
        job_id: &JobId,
        outcome: JobOutcome,
    ) -> Result<JobSummary, OrchestratorError> {
        let mut jobs = self.jobs.write().await;
        let summary = find(&mut jobs, job_id)?;
        summary.finish(outcome);
        Ok(summary.clone())
    }

    /// Fail a job whose worker went away without an outcome.
    pub async fn mark_lost(
        &self,
        job_id: &JobId,
        reason: &str,
    ) -> Result<JobSummary, OrchestratorError> {
        let mut jobs = self.jobs.write().await;
        let summary = find(&mut jobs, job_id)?;
        summary.fail(reason);
        Ok(summary.clone())
    }

    pub async fn mark_skipped(&self, job_id: &JobId, reason: &str) -> Result<(), OrchestratorError> {
        self.update(job_id, |summary| summary.skip(reason)).await
    }

    /// Jobs that have not reached a terminal status.
    pub async fn unfinished(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|j| !j.status.is_terminal())
            .map(|j| j.job.id.clone())
            .collect()
    }

    pub async fn record_event(&self, event: PipelineEvent) {
        self.events.write().await.push(event);
    }

    /// Every event recorded so far, in emission order.
    pub async fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().await.clone()
    }

    /// Snapshot the run as a report.
    pub async fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            pipeline: self.pipeline.clone(),
            phase: self.phase().await,
            policy: self.policy,
            started_at: self.started_at,
            finished_at: *self.finished_at.read().await,
            jobs: self.jobs.read().await.clone(),
        }
    }

    async fn update<F>(&self, job_id: &JobId, f: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut JobSummary),
    {
        let mut jobs = self.jobs.write().await;
        f(find(&mut jobs, job_id)?);
        Ok(())
    }
}

fn find<'a>(
    jobs: &'a mut [JobSummary],
    job_id: &JobId,
) -> Result<&'a mut JobSummary, OrchestratorError> {
    jobs.iter_mut()
        .find(|j| &j.job.id == job_id)
        .ok_or_else(|| OrchestratorError::UnknownJob(job_id.to_string()))
}
