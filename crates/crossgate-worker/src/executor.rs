//! Job execution on a single worker.
//!
//! A job is a linear sequence of blocking steps:
//! provision -> [install helper] -> test.
//! The first failing step ends the job.

use std::sync::Arc;

use tracing::{error, info, warn};

use crossgate_core::{JobKind, JobOutcome, JobSpec, PipelineDefinition, TargetSpec};

use crate::env::WorkerEnv;
use crate::error::WorkerError;
use crate::fetch::ArtifactFetcher;
use crate::helper::CrossHelperInstaller;
use crate::provisioner::ToolchainProvisioner;
use crate::runner::CommandRunner;

/// Runs pipeline jobs against one worker environment.
#[derive(Clone)]
pub struct JobExecutor {
    runner: Arc<dyn CommandRunner>,
    provisioner: ToolchainProvisioner,
    helper: CrossHelperInstaller,
    pipeline: Arc<PipelineDefinition>,
}

impl JobExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn ArtifactFetcher>,
        pipeline: Arc<PipelineDefinition>,
    ) -> Self {
        let provisioner = ToolchainProvisioner::new(
            runner.clone(),
            fetcher.clone(),
            pipeline.toolchain.clone(),
        );
        let helper = CrossHelperInstaller::new(
            runner.clone(),
            fetcher,
            pipeline.matrix.helper.clone(),
        );

        Self {
            runner,
            provisioner,
            helper,
            pipeline,
        }
    }

    pub fn provisioner(&self) -> &ToolchainProvisioner {
        &self.provisioner
    }

    /// Execute `job` in `env` and report what happened.
    pub async fn execute(&self, job: &JobSpec, env: &mut WorkerEnv) -> JobOutcome {
        info!(job = %job.name, job_id = %job.id, "Starting job");

        let mut outcome = JobOutcome::passed();
        let result = self.execute_steps(job, env, &mut outcome).await;

        match result {
            Ok(()) => {
                info!(job = %job.name, "Job passed");
            }
            Err(e) => {
                error!(job = %job.name, error = %e, kind = ?e.kind(), "Job failed");
                outcome.failure = Some((e.kind(), e.to_string()));
            }
        }
        outcome
    }

    async fn execute_steps(
        &self,
        job: &JobSpec,
        env: &mut WorkerEnv,
        outcome: &mut JobOutcome,
    ) -> Result<(), WorkerError> {
        let provisioned = self.provisioner.ensure_toolchain(env).await?;
        outcome.toolchain_version = provisioned.version().map(str::to_string);
        outcome.provision_action = Some(provisioned.action);

        let command = match &job.kind {
            JobKind::Native => self.pipeline.native.test_command.clone(),
            JobKind::Target(target) => {
                self.helper.install(env).await?;
                outcome.helper_version = Some(self.helper.pin().version.clone());
                self.pipeline.matrix.test_command(target)
            }
        };

        self.run_tests(&command, job.kind.target(), env).await
    }

    async fn run_tests(
        &self,
        command: &[String],
        target: Option<&TargetSpec>,
        env: &WorkerEnv,
    ) -> Result<(), WorkerError> {
        let Some((program, args)) = command.split_first() else {
            return Err(WorkerError::TestFailure {
                command: String::new(),
                exit_code: None,
            });
        };

        let cmd = env.command(program.clone(), args.iter().cloned());
        info!(command = %cmd.display(), target = ?target.map(|t| t.as_str()), "Running test suite");

        let output = self.runner.run(&cmd).await?;
        if !output.success() {
            warn!(command = %cmd.display(), exit_code = ?output.exit_code, "Test suite failed");
            return Err(WorkerError::TestFailure {
                command: cmd.display(),
                exit_code: output.exit_code,
            });
        }
        Ok(())
    }
}
