//! Test doubles for the runner and fetcher seams.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::env::WorkerEnv;
use crate::error::{FetchError, RunnerError};
use crate::fetch::ArtifactFetcher;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

pub const RUSTC_VERSION: &str = "rustc 1.82.0 (f6e511eec 2024-10-15)";

const PREINSTALLED_BIN: &str = "/opt/rust/bin";

/// Simulates one worker machine: which tools are reachable through the
/// command's PATH, and which commands fail.
pub struct FakeMachine {
    toolchain_bin: Mutex<Option<PathBuf>>,
    default_toolchain: Mutex<bool>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeMachine {
    /// A machine with no toolchain.
    pub fn new() -> Self {
        Self {
            toolchain_bin: Mutex::new(None),
            default_toolchain: Mutex::new(false),
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A machine whose image already ships a toolchain on PATH.
    pub fn with_preinstalled_toolchain() -> Self {
        let machine = Self::with_bare_manager();
        *machine.default_toolchain.lock().unwrap() = true;
        machine
    }

    /// A machine whose image ships the toolchain manager but no default
    /// toolchain, as with a distro-packaged manager and an empty
    /// `RUSTUP_HOME`.
    pub fn with_bare_manager() -> Self {
        let machine = Self::new();
        *machine.toolchain_bin.lock().unwrap() = Some(PathBuf::from(PREINSTALLED_BIN));
        machine
    }

    /// Commands starting with `prefix` exit with code 1.
    pub fn fail_on(mut self, prefix: &str) -> Self {
        self.failing.push(prefix.to_string());
        self
    }

    /// A fresh environment backed by a temporary directory.
    pub fn env(&self) -> (WorkerEnv, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let base = format!("/usr/bin:/bin:{}", PREINSTALLED_BIN);
        let env = WorkerEnv::new(
            Some(base.into()),
            dir.path().join("checkout"),
            dir.path().join("scratch"),
            dir.path().join(".cargo"),
        );
        (env, dir)
    }

    /// Every command run so far, rendered with `CommandSpec::display`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn toolchain_visible(&self, cmd: &CommandSpec) -> bool {
        let bin = self.toolchain_bin.lock().unwrap().clone();
        match (bin, cmd.env_var("PATH")) {
            (Some(bin), Some(path)) => std::env::split_paths(path).any(|p| p == bin),
            _ => false,
        }
    }

    fn on_path(cmd: &CommandSpec, program: &str) -> bool {
        cmd.env_var("PATH")
            .map(|path| std::env::split_paths(path).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }
}

fn ok(stdout: &str) -> Result<CommandOutput, RunnerError> {
    Ok(CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
    })
}

#[async_trait]
impl CommandRunner for FakeMachine {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let line = cmd.display();
        self.calls.lock().unwrap().push(line.clone());

        let not_found = || Err(RunnerError::NotFound(cmd.program.clone()));

        match cmd.program.as_str() {
            "rustup" | "rustc" | "cargo" if !self.toolchain_visible(cmd) => return not_found(),
            "sh" | "tar" => {}
            "rustup" | "rustc" | "cargo" => {}
            other if !Self::on_path(cmd, other) => return not_found(),
            _ => {}
        }

        if self.failing.iter().any(|p| line.starts_with(p)) {
            return Ok(CommandOutput {
                exit_code: Some(1),
                stdout: String::new(),
            });
        }

        let has_default = *self.default_toolchain.lock().unwrap();
        if matches!(cmd.program.as_str(), "rustc" | "cargo") && !has_default {
            return Ok(CommandOutput {
                exit_code: Some(1),
                stdout: String::new(),
            });
        }

        match (cmd.program.as_str(), cmd.args.first().map(String::as_str)) {
            ("rustup", Some("--version")) => ok("rustup 1.27.1 (54dd3d00f 2024-04-24)\n"),
            ("rustc", Some("--version")) => ok(&format!("{}\n", RUSTC_VERSION)),
            ("sh", _) => {
                let home = cmd
                    .env_var("CARGO_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_default();
                *self.toolchain_bin.lock().unwrap() = Some(home.join("bin"));
                *self.default_toolchain.lock().unwrap() = true;
                ok("")
            }
            ("tar", _) => {
                // tar -xzf <archive> -C <dir>
                let dest = cmd.args.get(3).map(PathBuf::from).unwrap_or_default();
                std::fs::create_dir_all(&dest).unwrap();
                std::fs::write(dest.join("cross"), b"#!/bin/sh\n").unwrap();
                ok("")
            }
            _ => ok(""),
        }
    }
}

/// Records requested URLs and writes placeholder bytes.
pub struct FakeFetcher {
    fail: bool,
    urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            fail: false,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(FetchError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "connection reset",
            )));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, b"artifact")?;
        Ok(8)
    }
}
