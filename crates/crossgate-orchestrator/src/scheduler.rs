//! Run orchestration - native gate, then matrix fan-out.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crossgate_core::{
    AggregationPolicy, JobOutcome, JobSpec, JobStatus, JobSummary, PipelineDefinition,
    PipelineEvent, RunPhase, RunReport,
};

use crate::config::OrchestratorConfig;
use crate::dispatch::JobDispatcher;
use crate::error::OrchestratorError;
use crate::state::RunState;

/// Drives one pipeline run from `Pending` to a terminal phase.
pub struct Orchestrator {
    pipeline: Arc<PipelineDefinition>,
    dispatcher: Arc<dyn JobDispatcher>,
    config: OrchestratorConfig,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<PipelineDefinition>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            pipeline,
            dispatcher,
            config: OrchestratorConfig::default(),
            events: None,
        }
    }

    /// Builder method to override orchestration settings.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder method to stream progress events.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Policy in effect for this run.
    pub fn policy(&self) -> AggregationPolicy {
        self.config.policy.unwrap_or(self.pipeline.policy)
    }

    /// Execute the run and return its report.
    ///
    /// Job failures are recorded in the report; an `Err` means the run
    /// could not be orchestrated at all.
    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        self.pipeline.validate()?;

        let state = RunState::new(&self.pipeline.name, self.policy());
        let native = self.pipeline.native_job();
        let matrix = self.pipeline.expand_matrix();

        state.declare(native.clone()).await;
        for job in &matrix {
            state.declare(job.clone()).await;
        }

        info!(
            run_id = %state.run_id,
            pipeline = %state.pipeline,
            targets = matrix.len(),
            policy = ?state.policy,
            "Starting run"
        );
        self.emit(&state, PipelineEvent::run_started(state.run_id.clone(), &state.pipeline))
            .await;

        state.advance(RunPhase::NativeRunning).await?;
        let native_summary = self.run_job(&state, &native).await?;

        if native_summary.status != JobStatus::Passed {
            state.advance(RunPhase::NativeFailed).await?;
            self.skip_matrix(&state, &matrix).await?;
        } else {
            state.advance(RunPhase::NativePassed).await?;
            state.advance(RunPhase::MatrixRunning).await?;
            self.fan_out(&state, matrix).await?;
            state.advance(RunPhase::Completed).await?;
        }

        let report = state.report().await;
        let success = report.succeeded();
        info!(
            run_id = %report.run_id,
            phase = %report.phase,
            success,
            failed_targets = report.failed_targets().len(),
            "Run finished"
        );
        self.emit(&state, PipelineEvent::run_finished(state.run_id.clone(), success))
            .await;

        Ok(report)
    }

    async fn run_job(
        &self,
        state: &RunState,
        job: &JobSpec,
    ) -> Result<JobSummary, OrchestratorError> {
        start_job(state, &self.events, job).await?;
        let outcome = self.dispatcher.dispatch(job).await;
        self.finish_job(state, job, outcome).await
    }

    async fn finish_job(
        &self,
        state: &RunState,
        job: &JobSpec,
        outcome: JobOutcome,
    ) -> Result<JobSummary, OrchestratorError> {
        let summary = state.record_outcome(&job.id, outcome).await?;

        let event = match summary.status {
            JobStatus::Passed => {
                info!(job = %job.name, duration_ms = ?summary.duration_ms(), "Job passed");
                PipelineEvent::job_passed(state.run_id.clone(), job.id.clone(), summary.duration_ms())
            }
            _ => {
                warn!(
                    job = %job.name,
                    kind = ?summary.failure_kind,
                    error = ?summary.error_message,
                    "Job failed"
                );
                PipelineEvent::job_failed(
                    state.run_id.clone(),
                    job.id.clone(),
                    summary.error_message.clone(),
                )
            }
        };
        self.emit(state, event).await;
        Ok(summary)
    }

    async fn skip_matrix(
        &self,
        state: &RunState,
        matrix: &[JobSpec],
    ) -> Result<(), OrchestratorError> {
        let reason = format!("{} did not pass", self.pipeline.native.name);
        warn!(run_id = %state.run_id, skipped = matrix.len(), "Native job failed, matrix not dispatched");

        for job in matrix {
            state.mark_skipped(&job.id, &reason).await?;
            self.emit(
                state,
                PipelineEvent::job_skipped(state.run_id.clone(), job.id.clone(), &reason),
            )
            .await;
        }
        Ok(())
    }

    /// Dispatch every matrix entry concurrently and wait for all of them.
    async fn fan_out(
        &self,
        state: &Arc<RunState>,
        matrix: Vec<JobSpec>,
    ) -> Result<(), OrchestratorError> {
        let permits = self
            .config
            .max_parallel
            .map_or(matrix.len().max(1), NonZeroUsize::get);
        let limit = Arc::new(Semaphore::new(permits));
        let mut set = JoinSet::new();

        for job in matrix {
            let dispatcher = self.dispatcher.clone();
            let limit = limit.clone();
            let state = state.clone();
            let events = self.events.clone();

            set.spawn(async move {
                // The semaphore is never closed.
                let _permit = limit.acquire_owned().await.ok();
                start_job(&state, &events, &job).await?;
                let outcome = dispatcher.dispatch(&job).await;
                Ok::<_, OrchestratorError>((job, outcome))
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((job, outcome))) => {
                    self.finish_job(state, &job, outcome).await?;
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    error!(run_id = %state.run_id, error = %e, "Matrix job task aborted");
                }
            }
        }

        // A job whose task panicked never reported an outcome.
        for job_id in state.unfinished().await {
            let summary = state
                .mark_lost(&job_id, "worker task ended without reporting an outcome")
                .await?;
            self.emit(
                state,
                PipelineEvent::job_failed(state.run_id.clone(), job_id, summary.error_message),
            )
            .await;
        }
        Ok(())
    }

    async fn emit(&self, state: &RunState, event: PipelineEvent) {
        emit(state, &self.events, event).await;
    }
}

async fn start_job(
    state: &RunState,
    events: &Option<mpsc::Sender<PipelineEvent>>,
    job: &JobSpec,
) -> Result<(), OrchestratorError> {
    state.mark_running(&job.id).await?;
    info!(run_id = %state.run_id, job = %job.name, job_id = %job.id, "Job dispatched");
    emit(
        state,
        events,
        PipelineEvent::job_started(state.run_id.clone(), job.id.clone(), &job.name),
    )
    .await;
    Ok(())
}

async fn emit(state: &RunState, events: &Option<mpsc::Sender<PipelineEvent>>, event: PipelineEvent) {
    state.record_event(event.clone()).await;
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            warn!(run_id = %state.run_id, "Event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use crossgate_core::{FailureKind, JobKind, PipelineEventType};

    /// Records dispatched jobs; fails or panics on request.
    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<JobSpec>>,
        fail: Vec<String>,
        panic_on: Option<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl RecordingDispatcher {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<JobSpec> {
            self.calls.lock().unwrap().clone()
        }

        fn target_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|j| j.kind != JobKind::Native)
                .count()
        }
    }

    #[async_trait]
    impl JobDispatcher for RecordingDispatcher {
        async fn dispatch(&self, job: &JobSpec) -> JobOutcome {
            self.calls.lock().unwrap().push(job.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let label = match job.kind.target() {
                Some(t) => t.as_str().to_string(),
                None => job.name.clone(),
            };
            if self.panic_on.as_deref() == Some(label.as_str()) {
                panic!("worker lost");
            }

            let mut outcome = if self.fail.contains(&label) {
                JobOutcome::failed(FailureKind::Test, format!("{} exited with code 101", label))
            } else {
                JobOutcome::passed()
            };
            if job.kind.target().is_some() {
                outcome.helper_version = Some(crossgate_core::DEFAULT_HELPER_VERSION.to_string());
            }
            outcome
        }
    }

    fn orchestrator(dispatcher: &Arc<RecordingDispatcher>) -> Orchestrator {
        Orchestrator::new(Arc::new(PipelineDefinition::default()), dispatcher.clone())
    }

    #[tokio::test]
    async fn test_native_failure_blocks_matrix() {
        let dispatcher = Arc::new(RecordingDispatcher::failing(&["full-test"]));
        let report = orchestrator(&dispatcher).run().await.unwrap();

        assert_eq!(dispatcher.target_calls(), 0);
        assert_eq!(report.matrix_jobs_started(), 0);
        assert_eq!(report.phase, RunPhase::NativeFailed);
        assert!(report.targets().all(|j| j.status == JobStatus::Skipped));
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_native_pass_dispatches_each_target_once() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let report = orchestrator(&dispatcher).run().await.unwrap();

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].kind, JobKind::Native);

        let mut triples: Vec<String> = calls[1..]
            .iter()
            .filter_map(|j| j.kind.target().map(|t| t.as_str().to_string()))
            .collect();
        triples.sort();
        assert_eq!(
            triples,
            vec![
                "aarch64-unknown-linux-gnu",
                "aarch64-unknown-linux-musl",
                "arm-unknown-linux-musleabi",
            ]
        );

        assert_eq!(report.phase, RunPhase::Completed);
        assert_eq!(report.matrix_jobs_started(), 3);
        assert!(report
            .targets()
            .all(|j| j.helper_version.as_deref() == Some("v0.2.4")));
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_report_keeps_declaration_order() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let pipeline = PipelineDefinition::default();
        let report = orchestrator(&dispatcher).run().await.unwrap();

        let names: Vec<&str> = report.jobs.iter().map(|j| j.job.name.as_str()).collect();
        let mut expected = vec![pipeline.native.name.clone()];
        expected.extend(pipeline.expand_matrix().into_iter().map(|j| j.name));
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_target_failure_is_isolated() {
        let dispatcher = Arc::new(RecordingDispatcher::failing(&["aarch64-unknown-linux-gnu"]));
        let report = orchestrator(&dispatcher).run().await.unwrap();

        assert_eq!(report.matrix_jobs_started(), 3);
        let failed = report.failed_targets();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].job.kind.target().map(|t| t.as_str()),
            Some("aarch64-unknown-linux-gnu")
        );
        assert_eq!(
            report.targets().filter(|j| j.status == JobStatus::Passed).count(),
            2
        );
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_all_targets_policy_override() {
        let dispatcher = Arc::new(RecordingDispatcher::failing(&["arm-unknown-linux-musleabi"]));
        let report = orchestrator(&dispatcher)
            .with_config(OrchestratorConfig {
                policy: Some(AggregationPolicy::AllTargets),
                ..OrchestratorConfig::default()
            })
            .run()
            .await
            .unwrap();

        assert_eq!(report.policy, AggregationPolicy::AllTargets);
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn test_events_bracket_the_run() {
        let dispatcher = Arc::new(RecordingDispatcher::failing(&["full-test"]));
        let (tx, mut rx) = mpsc::channel(64);
        orchestrator(&dispatcher).with_events(tx).run().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.event_type);
        }
        assert_eq!(
            events,
            vec![
                PipelineEventType::RunStarted,
                PipelineEventType::JobStarted,
                PipelineEventType::JobFailed,
                PipelineEventType::JobSkipped,
                PipelineEventType::JobSkipped,
                PipelineEventType::JobSkipped,
                PipelineEventType::RunFinished,
            ]
        );
    }

    #[tokio::test]
    async fn test_max_parallel_limits_fan_out() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let report = orchestrator(&dispatcher)
            .with_config(OrchestratorConfig {
                max_parallel: Some(NonZeroUsize::MIN),
                ..OrchestratorConfig::default()
            })
            .run()
            .await
            .unwrap();

        assert_eq!(report.matrix_jobs_started(), 3);
        assert_eq!(dispatcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_worker_fails_only_its_job() {
        let dispatcher = Arc::new(RecordingDispatcher {
            panic_on: Some("aarch64-unknown-linux-musl".to_string()),
            ..RecordingDispatcher::default()
        });
        let report = orchestrator(&dispatcher).run().await.unwrap();

        assert_eq!(report.phase, RunPhase::Completed);
        let failed = report.failed_targets();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("without reporting")));
        assert!(report.jobs.iter().all(|j| j.status.is_terminal()));
    }

    #[tokio::test]
    async fn test_invalid_pipeline_dispatches_nothing() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut pipeline = PipelineDefinition::default();
        pipeline.matrix.needs = "something-else".to_string();

        let result = Orchestrator::new(Arc::new(pipeline), dispatcher.clone())
            .run()
            .await;

        assert!(matches!(result, Err(OrchestratorError::Core(_))));
        assert!(dispatcher.calls().is_empty());
    }
}
