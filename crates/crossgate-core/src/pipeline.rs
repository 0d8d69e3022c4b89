//! Pipeline definition: triggers, toolchain, native job and target matrix.
//!
//! Loaded from `crossgate.toml`. Every field has a default, so an empty
//! file (or no file at all) yields the built-in pipeline: test natively,
//! then test `aarch64-unknown-linux-musl`, `aarch64-unknown-linux-gnu` and
//! `arm-unknown-linux-musleabi` through `cross` v0.2.4.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::trigger::{TriggerConfig, TriggerRules};
use crate::{AggregationPolicy, CoreError, JobSpec, TargetSpec};

/// File looked up when no pipeline path is given.
pub const DEFAULT_PIPELINE_FILE: &str = "crossgate.toml";

/// Pinned release of the cross-build helper.
pub const DEFAULT_HELPER_VERSION: &str = "v0.2.4";

/// Complete pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDefinition {
    /// Pipeline name, used in logs and reports.
    pub name: String,

    /// How per-job results fold into the run outcome.
    pub policy: AggregationPolicy,

    pub trigger: TriggerConfig,

    pub toolchain: ToolchainSettings,

    pub native: NativeJob,

    pub matrix: MatrixJob,
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self {
            name: "rust".to_string(),
            policy: AggregationPolicy::default(),
            trigger: TriggerConfig::default(),
            toolchain: ToolchainSettings::default(),
            native: NativeJob::default(),
            matrix: MatrixJob::default(),
        }
    }
}

impl PipelineDefinition {
    /// Parse and validate a TOML pipeline definition.
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        let def: Self = toml::from_str(s).map_err(|e| CoreError::Serialization(e.to_string()))?;
        def.validate()?;
        Ok(def)
    }

    /// Load `path`, or `crossgate.toml` in `project_dir` if present, or the
    /// built-in pipeline.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>, project_dir: &Path) -> Result<Self, CoreError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (project_dir.join(DEFAULT_PIPELINE_FILE), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CoreError::ConfigRead {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Render the definition as TOML.
    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Check the structural rules a host scheduler relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.native.name.trim().is_empty() {
            return Err(CoreError::InvalidPipeline("native job has no name".into()));
        }
        if self.native.test_command.is_empty() {
            return Err(CoreError::InvalidPipeline("native job has no test command".into()));
        }
        if self.matrix.name.trim().is_empty() {
            return Err(CoreError::InvalidPipeline("matrix job has no name".into()));
        }
        if self.matrix.name == self.native.name {
            return Err(CoreError::InvalidPipeline(format!(
                "matrix job and native job share the name '{}'",
                self.native.name
            )));
        }
        if self.matrix.needs != self.native.name {
            return Err(CoreError::InvalidPipeline(format!(
                "matrix job '{}' needs '{}', but the native job is '{}'",
                self.matrix.name, self.matrix.needs, self.native.name
            )));
        }
        if self.matrix.targets.is_empty() {
            return Err(CoreError::InvalidPipeline("matrix declares no targets".into()));
        }

        let mut seen = HashSet::new();
        for target in &self.matrix.targets {
            if !seen.insert(target.as_str()) {
                return Err(CoreError::InvalidPipeline(format!(
                    "target '{}' declared twice",
                    target
                )));
            }
        }

        self.matrix.helper.validate()?;
        TriggerRules::compile(&self.trigger)?;
        Ok(())
    }

    /// Compile the trigger section.
    pub fn trigger_rules(&self) -> Result<TriggerRules, CoreError> {
        TriggerRules::compile(&self.trigger)
    }

    /// The native job instance.
    pub fn native_job(&self) -> JobSpec {
        JobSpec::native(&self.native.name)
    }

    /// One job instance per declared target, in declaration order.
    pub fn expand_matrix(&self) -> Vec<JobSpec> {
        self.matrix
            .targets
            .iter()
            .map(|t| JobSpec::matrix_entry(&self.matrix.name, t.clone(), &self.matrix.needs))
            .collect()
    }
}

/// How the toolchain is installed when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// URL of the non-interactive installer script.
    pub installer_url: String,

    /// Installation profile.
    pub profile: String,

    /// Default release channel.
    pub channel: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            installer_url: "https://sh.rustup.rs".to_string(),
            profile: "minimal".to_string(),
            channel: "stable".to_string(),
        }
    }
}

/// The native test job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeJob {
    pub name: String,

    /// Test command, program first.
    pub test_command: Vec<String>,
}

impl Default for NativeJob {
    fn default() -> Self {
        Self {
            name: "full-test".to_string(),
            test_command: vec!["cargo".to_string(), "test".to_string()],
        }
    }
}

/// The cross-target matrix job template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixJob {
    pub name: String,

    /// Job that must pass before any matrix entry starts.
    pub needs: String,

    /// One job instance per target.
    pub targets: Vec<TargetSpec>,

    /// Arguments passed to the helper; `--target <triple>` is appended.
    pub test_args: Vec<String>,

    pub helper: HelperPin,
}

impl Default for MatrixJob {
    fn default() -> Self {
        let targets = [
            "aarch64-unknown-linux-musl",
            "aarch64-unknown-linux-gnu",
            "arm-unknown-linux-musleabi",
        ]
        .iter()
        .filter_map(|t| TargetSpec::parse(t).ok())
        .collect();

        Self {
            name: "cross-test".to_string(),
            needs: NativeJob::default().name,
            targets,
            test_args: vec!["test".to_string()],
            helper: HelperPin::default(),
        }
    }
}

impl MatrixJob {
    /// Full helper invocation for `target`, program first.
    pub fn test_command(&self, target: &TargetSpec) -> Vec<String> {
        let mut cmd = Vec::with_capacity(self.test_args.len() + 3);
        cmd.push(self.helper.binary.clone());
        cmd.extend(self.test_args.iter().cloned());
        cmd.push("--target".to_string());
        cmd.push(target.to_string());
        cmd
    }
}

/// Exact release of the cross-build helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperPin {
    /// Release tag. Must be exact; floating tags are rejected.
    pub version: String,

    /// Host triple of the helper build to download.
    pub host: String,

    /// Archive URL; `{version}` and `{host}` are substituted.
    pub url_template: String,

    /// Executable name inside the archive.
    pub binary: String,
}

impl Default for HelperPin {
    fn default() -> Self {
        Self {
            version: DEFAULT_HELPER_VERSION.to_string(),
            host: "x86_64-unknown-linux-musl".to_string(),
            url_template:
                "https://github.com/cross-rs/cross/releases/download/{version}/cross-{host}.tar.gz"
                    .to_string(),
            binary: "cross".to_string(),
        }
    }
}

impl HelperPin {
    /// Download URL of the pinned archive.
    pub fn archive_url(&self) -> String {
        self.url_template
            .replace("{version}", &self.version)
            .replace("{host}", &self.host)
    }

    fn validate(&self) -> Result<(), CoreError> {
        let v = self.version.trim();
        if v.is_empty() || v.eq_ignore_ascii_case("latest") || v.contains('*') {
            return Err(CoreError::InvalidPipeline(format!(
                "helper version '{}' is not an exact release",
                self.version
            )));
        }
        if self.binary.trim().is_empty() || self.binary.contains('/') {
            return Err(CoreError::InvalidPipeline(format!(
                "helper binary '{}' is not a plain file name",
                self.binary
            )));
        }
        Ok(())
    }
}
