//! Idempotent toolchain provisioning.
//!
//! Probe for the toolchain manager; update in place when present, otherwise
//! run the installer non-interactively and append the toolchain's binary
//! directory to the worker's search path.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crossgate_core::{ProvisionAction, ToolchainSettings, ToolchainState};

use crate::env::WorkerEnv;
use crate::error::WorkerError;
use crate::fetch::ArtifactFetcher;
use crate::runner::CommandRunner;

const MANAGER: &str = "rustup";
const COMPILER: &str = "rustc";
const INSTALLER_FILE: &str = "rustup-init.sh";

/// What `ensure_toolchain` did and what it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub action: ProvisionAction,
    pub state: ToolchainState,
}

impl ProvisionReport {
    pub fn version(&self) -> Option<&str> {
        self.state.version()
    }
}

/// Ensures a current compiler toolchain on a worker.
#[derive(Clone)]
pub struct ToolchainProvisioner {
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn ArtifactFetcher>,
    settings: ToolchainSettings,
}

impl ToolchainProvisioner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn ArtifactFetcher>,
        settings: ToolchainSettings,
    ) -> Self {
        Self {
            runner,
            fetcher,
            settings,
        }
    }

    /// Current toolchain state as seen through `env`'s search path.
    ///
    /// A manager without a usable default toolchain counts as absent.
    pub async fn probe(&self, env: &WorkerEnv) -> ToolchainState {
        if !self.manager_present(env).await {
            return ToolchainState::Absent;
        }
        match self.compiler_version(env).await {
            Ok(version) => ToolchainState::Present { version },
            Err(_) => ToolchainState::Absent,
        }
    }

    /// Install or update the toolchain.
    ///
    /// Safe to call repeatedly: a second call finds the toolchain and takes
    /// the update path without touching the search path again.
    pub async fn ensure_toolchain(
        &self,
        env: &mut WorkerEnv,
    ) -> Result<ProvisionReport, WorkerError> {
        let action = if let ToolchainState::Present { version } = self.probe(env).await {
            info!(version = %version, "Toolchain present, updating in place");
            self.update(env).await?;
            ProvisionAction::Updated
        } else {
            info!(
                profile = %self.settings.profile,
                channel = %self.settings.channel,
                "Toolchain absent, installing"
            );
            self.install(env).await?;
            ProvisionAction::FreshInstall
        };

        let version = self.compiler_version(env).await?;
        info!(version = %version, action = ?action, "Toolchain ready");

        Ok(ProvisionReport {
            action,
            state: ToolchainState::Present { version },
        })
    }

    async fn manager_present(&self, env: &WorkerEnv) -> bool {
        let cmd = env.command(MANAGER, ["--version"]);
        match self.runner.run(&cmd).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }

    async fn update(&self, env: &WorkerEnv) -> Result<(), WorkerError> {
        let cmd = env.command(MANAGER, ["update"]);
        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| WorkerError::Provisioning(e.to_string()))?;

        if !output.success() {
            warn!(exit_code = ?output.exit_code, "Toolchain update failed");
            return Err(WorkerError::Provisioning(format!(
                "'{}' exited with code {:?}",
                cmd.display(),
                output.exit_code
            )));
        }
        Ok(())
    }

    async fn install(&self, env: &mut WorkerEnv) -> Result<(), WorkerError> {
        let script = env.scratch_dir().join(INSTALLER_FILE);
        self.fetcher
            .fetch(&self.settings.installer_url, &script)
            .await
            .map_err(|e| WorkerError::Provisioning(e.to_string()))?;

        let cmd = env.command(
            "sh",
            [
                script.to_string_lossy().into_owned(),
                "-y".to_string(),
                "--profile".to_string(),
                self.settings.profile.clone(),
                "--default-toolchain".to_string(),
                self.settings.channel.clone(),
            ],
        );
        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| WorkerError::Provisioning(e.to_string()))?;

        if !output.success() {
            return Err(WorkerError::Provisioning(format!(
                "installer exited with code {:?}",
                output.exit_code
            )));
        }

        let bin = env.cargo_bin();
        if env.append_path(&bin) {
            info!(dir = %bin.display(), "Appended toolchain directory to search path");
        }
        Ok(())
    }

    async fn compiler_version(&self, env: &WorkerEnv) -> Result<String, WorkerError> {
        let cmd = env.command(COMPILER, ["--version"]);
        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| WorkerError::Provisioning(e.to_string()))?;

        if !output.success() {
            return Err(WorkerError::Provisioning(format!(
                "'{}' exited with code {:?}",
                cmd.display(),
                output.exit_code
            )));
        }
        Ok(output.stdout.trim().to_string())
    }
}
