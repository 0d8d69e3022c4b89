//! Per-worker execution environment.
//!
//! A `WorkerEnv` owns everything a job may mutate: its executable search
//! path, its scratch directory and the toolchain home it installs into.
//! Each job gets its own instance; nothing here is shared across jobs.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::runner::CommandSpec;

/// Environment of one worker for the lifetime of one job.
#[derive(Debug, Clone)]
pub struct WorkerEnv {
    /// Search path inherited from the host.
    base_path: Vec<PathBuf>,

    /// Directories appended during the job.
    appended: Vec<PathBuf>,

    /// Extra variables set on every command.
    vars: BTreeMap<String, String>,

    /// Project checkout; commands run here.
    work_dir: PathBuf,

    /// Downloads and extracted archives.
    scratch_dir: PathBuf,

    /// Toolchain home (`CARGO_HOME`).
    cargo_home: PathBuf,
}

impl WorkerEnv {
    /// Create an environment over the given search path.
    pub fn new(
        base_path: Option<OsString>,
        work_dir: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
        cargo_home: impl Into<PathBuf>,
    ) -> Self {
        let base_path = base_path
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();

        Self {
            base_path,
            appended: Vec::new(),
            vars: BTreeMap::new(),
            work_dir: work_dir.into(),
            scratch_dir: scratch_dir.into(),
            cargo_home: cargo_home.into(),
        }
    }

    /// Builder method to set a variable on every command.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn cargo_home(&self) -> &Path {
        &self.cargo_home
    }

    /// Toolchain binary directory.
    pub fn cargo_bin(&self) -> PathBuf {
        self.cargo_home.join("bin")
    }

    /// Append `dir` to the search path for the rest of the job.
    ///
    /// Returns false if the directory was already on the path.
    pub fn append_path(&mut self, dir: impl Into<PathBuf>) -> bool {
        let dir = dir.into();
        if self.base_path.contains(&dir) || self.appended.contains(&dir) {
            return false;
        }
        self.appended.push(dir);
        true
    }

    /// Directories appended so far.
    pub fn appended_paths(&self) -> &[PathBuf] {
        &self.appended
    }

    /// Full search path: inherited entries, then appended ones.
    pub fn search_path(&self) -> OsString {
        let entries = self.base_path.iter().chain(self.appended.iter());
        std::env::join_paths(entries).unwrap_or_default()
    }

    /// Build a command that runs in this environment.
    pub fn command<I, S>(&self, program: impl Into<String>, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(program)
            .args(args)
            .current_dir(&self.work_dir)
            .env("PATH", self.search_path())
            .env("CARGO_HOME", self.cargo_home.as_os_str().to_owned());

        for (key, value) in &self.vars {
            spec = spec.env(key, OsString::from(value));
        }
        spec
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn env() -> WorkerEnv {
        WorkerEnv::new(
            Some(OsString::from("/usr/bin:/bin")),
            "/work",
            "/tmp/scratch",
            "/home/ci/.cargo",
        )
    }

    #[test]
    fn test_append_path_once() {
        let mut env = env();
        assert!(env.append_path(env.cargo_bin()));
        assert!(!env.append_path("/home/ci/.cargo/bin"));
        assert!(!env.append_path("/usr/bin"));
        assert_eq!(env.appended_paths().len(), 1);
        assert_eq!(
            env.search_path(),
            OsString::from("/usr/bin:/bin:/home/ci/.cargo/bin")
        );
    }

    #[test]
    fn test_command_carries_environment() {
        let mut env = env().with_var("CARGO_TERM_COLOR", "always");
        env.append_path("/opt/tools");

        let cmd = env.command("cargo", ["test"]);
        assert_eq!(cmd.program, "cargo");
        assert_eq!(cmd.args, vec!["test"]);
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("/work")));
        assert_eq!(
            cmd.env_var("PATH"),
            Some(OsString::from("/usr/bin:/bin:/opt/tools").as_os_str())
        );
        assert!(cmd.env_var("CARGO_TERM_COLOR").is_some());
    }

    #[test]
    fn test_clones_do_not_share_path() {
        let base = env();
        let mut a = base.clone();
        let b = base.clone();
        a.append_path("/only/in/a");
        assert!(b.appended_paths().is_empty());
    }
}
