//! crossgate Core Pipeline Types
//!
//! This crate contains pure pipeline types with no dependencies on:
//! - Process spawning
//! - Network access
//! - Runtime specifics
//!
//! Everything a CI host needs to decide *whether* and *what* to run lives
//! here: trigger rules, the pipeline definition, matrix expansion and the
//! run report. Executing jobs is the worker crate's business.

pub mod error;
pub mod event;
pub mod ids;
pub mod job;
pub mod pipeline;
pub mod report;
pub mod status;
pub mod target;
pub mod trigger;
pub mod worker;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{PipelineEvent, PipelineEventType, PullRequestAction, TriggerEvent};
pub use ids::{EventId, JobId, RunId};
pub use job::{FailureKind, JobKind, JobOutcome, JobSpec, JobSummary};
pub use pipeline::{
    HelperPin, MatrixJob, NativeJob, PipelineDefinition, ToolchainSettings, DEFAULT_HELPER_VERSION,
    DEFAULT_PIPELINE_FILE,
};
pub use report::{AggregationPolicy, RunReport};
pub use status::{JobStatus, ProvisionAction, RunPhase, ToolchainState};
pub use target::{LibcFamily, TargetSpec};
pub use trigger::{SkipReason, TriggerConfig, TriggerDecision, TriggerRules};
pub use worker::WorkerInfo;
