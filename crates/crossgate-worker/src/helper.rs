//! Cross-build helper installation.
//!
//! The helper is always installed from an exact release archive so a given
//! target's behavior does not drift when new helper releases appear.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crossgate_core::HelperPin;

use crate::env::WorkerEnv;
use crate::error::WorkerError;
use crate::fetch::ArtifactFetcher;
use crate::runner::CommandRunner;

/// Fetches, extracts and places the pinned helper executable.
#[derive(Clone)]
pub struct CrossHelperInstaller {
    runner: Arc<dyn CommandRunner>,
    fetcher: Arc<dyn ArtifactFetcher>,
    pin: HelperPin,
}

impl CrossHelperInstaller {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fetcher: Arc<dyn ArtifactFetcher>,
        pin: HelperPin,
    ) -> Self {
        Self {
            runner,
            fetcher,
            pin,
        }
    }

    pub fn pin(&self) -> &HelperPin {
        &self.pin
    }

    /// Install the helper into the toolchain's binary directory and make
    /// sure that directory is on the search path.
    ///
    /// Returns the installed executable's path.
    pub async fn install(&self, env: &mut WorkerEnv) -> Result<PathBuf, WorkerError> {
        let url = self.pin.archive_url();
        let stem = format!("{}-{}", self.pin.binary, self.pin.version);
        let archive = env.scratch_dir().join(format!("{}.tar.gz", stem));
        let extract_dir = env.scratch_dir().join(&stem);

        info!(url = %url, version = %self.pin.version, "Installing cross helper");

        self.fetcher
            .fetch(&url, &archive)
            .await
            .map_err(|e| WorkerError::HelperInstall(e.to_string()))?;

        tokio::fs::create_dir_all(&extract_dir)
            .await
            .map_err(|e| WorkerError::HelperInstall(e.to_string()))?;

        let cmd = env.command(
            "tar",
            [
                "-xzf".to_string(),
                archive.to_string_lossy().into_owned(),
                "-C".to_string(),
                extract_dir.to_string_lossy().into_owned(),
            ],
        );
        let output = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| WorkerError::HelperInstall(e.to_string()))?;
        if !output.success() {
            return Err(WorkerError::HelperInstall(format!(
                "extracting {} exited with code {:?}",
                archive.display(),
                output.exit_code
            )));
        }

        let extracted = extract_dir.join(&self.pin.binary);
        if !tokio::fs::try_exists(&extracted).await.unwrap_or(false) {
            return Err(WorkerError::HelperInstall(format!(
                "archive {} does not contain '{}'",
                url, self.pin.binary
            )));
        }

        let bin_dir = env.cargo_bin();
        let installed = bin_dir.join(&self.pin.binary);
        tokio::fs::create_dir_all(&bin_dir)
            .await
            .map_err(|e| WorkerError::HelperInstall(e.to_string()))?;
        tokio::fs::copy(&extracted, &installed)
            .await
            .map_err(|e| WorkerError::HelperInstall(e.to_string()))?;
        make_executable(&installed).await?;

        env.append_path(&bin_dir);

        info!(path = %installed.display(), version = %self.pin.version, "Cross helper installed");
        Ok(installed)
    }
}

#[cfg(unix)]
async fn make_executable(path: &std::path::Path) -> Result<(), WorkerError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| WorkerError::HelperInstall(e.to_string()))
}

#[cfg(not(unix))]
async fn make_executable(_path: &std::path::Path) -> Result<(), WorkerError> {
    Ok(())
}
