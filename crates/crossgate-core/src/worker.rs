//! Worker information types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of the ephemeral environment a job runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Hostname of the worker machine.
    pub hostname: String,

    /// Operating system, as reported by `std::env::consts::OS`.
    pub os: String,

    /// CPU architecture, as reported by `std::env::consts::ARCH`.
    pub arch: String,

    /// Pre-installed tools found on the worker, with their version line.
    /// The inventory varies between hosts and is informational only.
    pub tools: BTreeMap<String, String>,
}

impl WorkerInfo {
    /// Describe the machine this process runs on.
    pub fn current(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tools: BTreeMap::new(),
        }
    }

    /// Builder method to record a tool.
    pub fn with_tool(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.tools.insert(name.into(), version.into());
        self
    }

    /// Check if a tool was found on this worker.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}
