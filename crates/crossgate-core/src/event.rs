//! Incoming trigger events and outgoing pipeline progress events.

use crate::ids::{EventId, JobId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle action carried by a pull-request event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    Reopened,
    ReadyForReview,
    Closed,
    Edited,
    ConvertedToDraft,
    #[serde(other)]
    Other,
}

/// An event delivered by the CI host that may start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// Commits pushed to a branch.
    Push {
        branch: String,
        #[serde(default)]
        changed_paths: Vec<String>,
    },
    /// A pull request changed state.
    PullRequest {
        action: PullRequestAction,
        #[serde(default)]
        draft: bool,
        #[serde(default)]
        changed_paths: Vec<String>,
    },
}

impl TriggerEvent {
    /// Paths touched by the change.
    pub fn changed_paths(&self) -> &[String] {
        match self {
            Self::Push { changed_paths, .. } | Self::PullRequest { changed_paths, .. } => {
                changed_paths
            }
        }
    }

    /// Whether this is a pull request marked as draft.
    pub fn is_draft(&self) -> bool {
        matches!(self, Self::PullRequest { draft: true, .. })
    }
}

/// A progress event emitted while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Job this event refers to, if any.
    pub job_id: Option<JobId>,
    /// Type of event.
    pub event_type: PipelineEventType,
    /// Unix timestamp (milliseconds) when event occurred.
    pub timestamp_ms: i64,
    /// Event-specific metadata (job name, target, error, ...).
    pub metadata: HashMap<String, String>,
}

impl PipelineEvent {
    /// Create a new pipeline event.
    pub fn new(
        run_id: RunId,
        job_id: Option<JobId>,
        event_type: PipelineEventType,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            run_id,
            job_id,
            event_type,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            metadata,
        }
    }

    /// Create a RunStarted event.
    pub fn run_started(run_id: RunId, pipeline: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("pipeline".to_string(), pipeline.to_string());
        Self::new(run_id, None, PipelineEventType::RunStarted, metadata)
    }

    /// Create a JobStarted event.
    pub fn job_started(run_id: RunId, job_id: JobId, job_name: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("job_name".to_string(), job_name.to_string());
        Self::new(run_id, Some(job_id), PipelineEventType::JobStarted, metadata)
    }

    /// Create a JobPassed event.
    pub fn job_passed(run_id: RunId, job_id: JobId, duration_ms: Option<i64>) -> Self {
        let mut metadata = HashMap::new();
        if let Some(d) = duration_ms {
            metadata.insert("duration_ms".to_string(), d.to_string());
        }
        Self::new(run_id, Some(job_id), PipelineEventType::JobPassed, metadata)
    }

    /// Create a JobFailed event.
    pub fn job_failed(run_id: RunId, job_id: JobId, error: Option<String>) -> Self {
        let mut metadata = HashMap::new();
        if let Some(e) = error {
            metadata.insert("error".to_string(), e);
        }
        Self::new(run_id, Some(job_id), PipelineEventType::JobFailed, metadata)
    }

    /// Create a JobSkipped event.
    pub fn job_skipped(run_id: RunId, job_id: JobId, reason: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("reason".to_string(), reason.to_string());
        Self::new(run_id, Some(job_id), PipelineEventType::JobSkipped, metadata)
    }

    /// Create a RunFinished event.
    pub fn run_finished(run_id: RunId, success: bool) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("success".to_string(), success.to_string());
        Self::new(run_id, None, PipelineEventType::RunFinished, metadata)
    }
}

/// Type of pipeline progress event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventType {
    RunStarted,
    JobStarted,
    JobPassed,
    JobFailed,
    JobSkipped,
    RunFinished,
}
