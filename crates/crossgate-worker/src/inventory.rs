//! Worker tool inventory.

use tracing::debug;

use crossgate_core::WorkerInfo;

use crate::env::WorkerEnv;
use crate::runner::CommandRunner;

/// Tools worth recording when they happen to be installed.
const PROBED_TOOLS: &[&str] = &["rustup", "rustc", "cargo", "cross", "docker", "podman"];

/// Describe the worker `env` runs on, probing each known tool's version.
pub async fn describe_worker(runner: &dyn CommandRunner, env: &WorkerEnv) -> WorkerInfo {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    let mut info = WorkerInfo::current(hostname);

    for tool in PROBED_TOOLS {
        let cmd = env.command(*tool, ["--version"]);
        match runner.run(&cmd).await {
            Ok(output) if output.success() => {
                let version = output.stdout.lines().next().unwrap_or_default().trim();
                info = info.with_tool(*tool, version);
            }
            Ok(_) | Err(_) => debug!(tool = %tool, "Tool not available"),
        }
    }
    info
}
