//! External program invocation.
//!
//! Every program a job runs (toolchain manager, installer, archiver, test
//! command) goes through [`CommandRunner`], so job logic can be exercised
//! against a scripted runner in tests.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::RunnerError;

/// A fully described program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, OsString)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set a variable, replacing an earlier value for the same key.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&OsStr> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Program and arguments joined by spaces, for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion.
    ///
    /// A non-zero exit is reported in [`CommandOutput`], not as an error;
    /// errors mean the program could not be run at all.
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs programs as child processes, streaming their output into the log.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        info!(command = %spec.display(), "Running command");

        // Resolve the program against the job's PATH, not ours.
        let program = match spec.env_var("PATH") {
            Some(path) => {
                let cwd = spec
                    .cwd
                    .clone()
                    .or_else(|| std::env::current_dir().ok())
                    .unwrap_or_default();
                which::which_in(&spec.program, Some(path), cwd)
                    .map_err(|_| RunnerError::NotFound(spec.program.clone()))?
            }
            None => PathBuf::from(&spec.program),
        };
        debug!(program = %program.display(), "Resolved program");

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::NotFound(spec.program.clone())
            } else {
                error!(error = %e, program = %spec.program, "Failed to spawn process");
                RunnerError::Spawn {
                    program: spec.program.clone(),
                    source: e,
                }
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async move {
            let mut captured = String::new();
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(stream = "stdout", "{}", line);
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
            captured
        };

        let read_stderr = async move {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(stream = "stderr", "{}", line);
                }
            }
        };

        let (captured, (), status) = tokio::join!(read_stdout, read_stderr, child.wait());
        let status = status.map_err(|e| RunnerError::Spawn {
            program: spec.program.clone(),
            source: e,
        })?;

        let exit_code = status.code();
        info!(command = %spec.display(), exit_code = ?exit_code, "Command exited");

        Ok(CommandOutput {
            exit_code,
            stdout: captured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_env_replaces() {
        let spec = CommandSpec::new("cargo")
            .arg("test")
            .env("PATH", "/a")
            .env("PATH", "/b");
        assert_eq!(spec.env.len(), 1);
        assert_eq!(spec.env_var("PATH"), Some(OsStr::new("/b")));
        assert_eq!(spec.display(), "cargo test");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("crossgate-definitely-not-installed").env("PATH", "");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo hello; exit 3"])
            .env("PATH", "/usr/bin:/bin");
        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_skips_non_executable_path_entry() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let shadow = dir.path().join("shadow");
        let real = dir.path().join("real");
        for (bin, body, mode) in [
            (&shadow, "#!/bin/sh\necho shadowed\n", 0o644),
            (&real, "#!/bin/sh\necho ran\n", 0o755),
        ] {
            std::fs::create_dir_all(bin).unwrap();
            let tool = bin.join("crossgate-tool");
            std::fs::write(&tool, body).unwrap();
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(mode)).unwrap();
        }

        let path = std::env::join_paths([shadow, real, "/usr/bin".into(), "/bin".into()]).unwrap();
        let spec = CommandSpec::new("crossgate-tool")
            .current_dir(dir.path())
            .env("PATH", path);

        let output = ProcessRunner::new().run(&spec).await.unwrap();
        assert_eq!(output.stdout, "ran\n");
        assert!(output.success());
    }
}
