//! Job dispatch to workers.
//!
//! The orchestrator hands each job to a `JobDispatcher` and waits for its
//! outcome. Every dispatch must land on a fresh worker: no toolchain,
//! search path or scratch state carries over from another job.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crossgate_core::{JobId, JobOutcome, JobSpec, PipelineDefinition};
use crossgate_worker::{ArtifactFetcher, CommandRunner, JobExecutor, WorkerConfig, WorkerEnv};

/// Runs one job on one isolated worker.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Run `job` to completion. Failures are reported in the outcome.
    async fn dispatch(&self, job: &JobSpec) -> JobOutcome;
}

/// Where a local worker installs its toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainHome {
    /// Each job provisions into its own scratch directory and never sees
    /// the host's toolchain.
    PerJob,
    /// Every job uses this toolchain home. Jobs then share installed
    /// tools, so the run should not dispatch them concurrently.
    Shared(PathBuf),
}

/// Runs jobs as local processes, one scratch directory per job.
pub struct LocalDispatcher {
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn ArtifactFetcher>,
    pipeline: Arc<PipelineDefinition>,
    base: WorkerConfig,
    home: ToolchainHome,
}

impl LocalDispatcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn ArtifactFetcher>,
        pipeline: Arc<PipelineDefinition>,
        base: WorkerConfig,
        home: ToolchainHome,
    ) -> Self {
        Self {
            runner,
            fetcher,
            pipeline,
            base,
            home,
        }
    }

    /// Jobs may share tools between them.
    pub fn shares_toolchain(&self) -> bool {
        matches!(self.home, ToolchainHome::Shared(_))
    }

    /// Worker configuration for one job.
    fn job_config(&self, job_id: &JobId) -> WorkerConfig {
        let mut config = self.base.clone();
        match &self.home {
            ToolchainHome::Shared(home) => {
                config.cargo_home = home.clone();
            }
            ToolchainHome::PerJob => {
                let host_bin = self.base.cargo_home.join("bin");
                config.base_path = self
                    .base
                    .base_path
                    .as_ref()
                    .and_then(|p| without_dir(p, &host_bin));
                config.cargo_home = self.base.scratch_root.join(job_id.as_str()).join("cargo");
            }
        }
        config
    }

    /// Fresh environment for one job.
    fn job_env(&self, config: &WorkerConfig, job_id: &JobId) -> WorkerEnv {
        let env = config.worker_env(job_id);
        match self.home {
            ToolchainHome::Shared(_) => env,
            ToolchainHome::PerJob => {
                let rustup_home = config.scratch_root.join(job_id.as_str()).join("rustup");
                env.with_var("RUSTUP_HOME", rustup_home.to_string_lossy())
            }
        }
    }
}

#[async_trait]
impl JobDispatcher for LocalDispatcher {
    async fn dispatch(&self, job: &JobSpec) -> JobOutcome {
        let config = self.job_config(&job.id);
        let mut env = self.job_env(&config, &job.id);
        debug!(
            job = %job.name,
            scratch = %env.scratch_dir().display(),
            cargo_home = %env.cargo_home().display(),
            "Dispatching job to local worker"
        );

        let executor = JobExecutor::new(
            self.runner.clone(),
            self.fetcher.clone(),
            self.pipeline.clone(),
        );
        let outcome = executor.execute(job, &mut env).await;

        let job_root = config.scratch_root.join(job.id.as_str());
        if let Err(e) = remove_scratch(&job_root).await {
            warn!(job = %job.name, path = %job_root.display(), error = %e, "Failed to remove job scratch directory");
        }
        outcome
    }
}

async fn remove_scratch(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// `path` with every occurrence of `dir` removed.
fn without_dir(path: &OsString, dir: &Path) -> Option<OsString> {
    let kept: Vec<PathBuf> = std::env::split_paths(path).filter(|p| p != dir).collect();
    std::env::join_paths(kept).ok()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crossgate_core::FailureKind;
    use crossgate_worker::{CommandOutput, CommandSpec, FetchError, RunnerError};

    /// A worker where no command can be found.
    #[derive(Default)]
    struct EmptyMachine {
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for EmptyMachine {
        async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, RunnerError> {
            let path = cmd
                .env_var("PATH")
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.paths.lock().unwrap().push(path);
            if cmd.program == "sh" {
                return Ok(CommandOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                });
            }
            Err(RunnerError::NotFound(cmd.program.clone()))
        }
    }

    struct NoNetwork;

    #[async_trait]
    impl ArtifactFetcher for NoNetwork {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, b"#!/bin/sh\nexit 1\n")?;
            Ok(17)
        }
    }

    fn dispatcher(
        dir: &Path,
        home: ToolchainHome,
    ) -> (LocalDispatcher, Arc<EmptyMachine>) {
        let machine = Arc::new(EmptyMachine::default());
        let base = WorkerConfig {
            project_dir: dir.join("checkout"),
            cargo_home: PathBuf::from("/home/ci/.cargo"),
            scratch_root: dir.join("scratch"),
            base_path: Some(OsString::from("/usr/bin:/home/ci/.cargo/bin:/bin")),
        };
        let dispatcher = LocalDispatcher::new(
            machine.clone(),
            Arc::new(NoNetwork),
            Arc::new(PipelineDefinition::default()),
            base,
            home,
        );
        (dispatcher, machine)
    }

    #[test]
    fn test_per_job_home_hides_host_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(dir.path(), ToolchainHome::PerJob);

        let config = dispatcher.job_config(&JobId::new("job-1"));
        assert_eq!(config.base_path, Some(OsString::from("/usr/bin:/bin")));
        assert_eq!(
            config.cargo_home,
            dir.path().join("scratch").join("job-1").join("cargo")
        );
        assert!(!dispatcher.shares_toolchain());

        let cmd = dispatcher
            .job_env(&config, &JobId::new("job-1"))
            .command("rustup", ["--version"]);
        assert_eq!(
            cmd.env_var("RUSTUP_HOME").map(PathBuf::from),
            Some(dir.path().join("scratch").join("job-1").join("rustup"))
        );
    }

    #[test]
    fn test_shared_home_keeps_host_path() {
        let dir = tempfile::tempdir().unwrap();
        let home = PathBuf::from("/opt/cargo");
        let (dispatcher, _) = dispatcher(dir.path(), ToolchainHome::Shared(home.clone()));

        let config = dispatcher.job_config(&JobId::new("job-1"));
        assert_eq!(
            config.base_path,
            Some(OsString::from("/usr/bin:/home/ci/.cargo/bin:/bin"))
        );
        assert_eq!(config.cargo_home, home);
        assert!(dispatcher.shares_toolchain());
    }

    #[tokio::test]
    async fn test_dispatch_reports_failure_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, machine) = dispatcher(dir.path(), ToolchainHome::PerJob);
        let job = PipelineDefinition::default().native_job();

        let outcome = dispatcher.dispatch(&job).await;

        assert_eq!(
            outcome.failure.map(|(k, _)| k),
            Some(FailureKind::Provisioning)
        );
        assert!(!dir.path().join("scratch").join(job.id.as_str()).exists());
        assert!(machine
            .paths
            .lock()
            .unwrap()
            .iter()
            .all(|p| !p.contains("/home/ci/.cargo/bin")));
    }
}
