//! Worker configuration.

use std::ffi::OsString;
use std::path::PathBuf;

use crossgate_core::JobId;

use crate::env::WorkerEnv;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Project checkout the test suite runs in.
    pub project_dir: PathBuf,

    /// Toolchain home (`CARGO_HOME`).
    pub cargo_home: PathBuf,

    /// Parent of the per-job scratch directories.
    pub scratch_root: PathBuf,

    /// Search path inherited by every job.
    pub base_path: Option<OsString>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let cargo_home = std::env::var_os("CARGO_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cargo")))
            .unwrap_or_else(|| PathBuf::from(".cargo"));

        Self {
            project_dir: PathBuf::from("."),
            cargo_home,
            scratch_root: std::env::temp_dir().join("crossgate"),
            base_path: std::env::var_os("PATH"),
        }
    }
}

impl WorkerConfig {
    /// A fresh environment for one job, with its own scratch directory.
    pub fn worker_env(&self, job_id: &JobId) -> WorkerEnv {
        WorkerEnv::new(
            self.base_path.clone(),
            self.project_dir.clone(),
            self.scratch_root.join(job_id.as_str()),
            self.cargo_home.clone(),
        )
    }
}
