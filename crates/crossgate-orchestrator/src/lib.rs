//! crossgate Orchestrator Library
//!
//! Runs the native job, and only when it passes fans the cross-target
//! matrix out to independent workers. Job dispatch sits behind the
//! `JobDispatcher` trait; `LocalDispatcher` runs jobs on this machine.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod scheduler;
pub mod state;

pub use config::OrchestratorConfig;
pub use dispatch::{JobDispatcher, LocalDispatcher, ToolchainHome};
pub use error::OrchestratorError;
pub use scheduler::Orchestrator;
pub use state::RunState;
