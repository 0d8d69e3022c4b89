//! crossgate Worker
//!
//! Everything that happens on a single worker: invoking programs, tracking
//! the worker's search path, provisioning the toolchain, installing the
//! pinned cross helper and running one job's test suite.
//!
//! External effects go through two seams, [`CommandRunner`] and
//! [`ArtifactFetcher`], so the job logic runs unchanged against fakes.

pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod helper;
pub mod inventory;
pub mod provisioner;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use config::WorkerConfig;
pub use env::WorkerEnv;
pub use error::{FetchError, RunnerError, WorkerError};
pub use executor::JobExecutor;
pub use fetch::{ArtifactFetcher, HttpFetcher};
pub use helper::CrossHelperInstaller;
pub use inventory::describe_worker;
pub use provisioner::{ProvisionReport, ToolchainProvisioner};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
