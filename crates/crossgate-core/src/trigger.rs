//! Trigger rules: decide whether an incoming event starts a run.
//!
//! Evaluation is a pure function of the event and the rules, so it can be
//! tested without any CI infrastructure.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::{CoreError, PullRequestAction, TriggerEvent};

/// Declarative trigger section of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Branches whose pushes start a run.
    pub push_branches: Vec<String>,

    /// Pull-request actions that start a run.
    pub pull_request_actions: Vec<PullRequestAction>,

    /// Path globs; at least one changed path must match one of them.
    /// An empty list disables path filtering.
    pub paths: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            push_branches: vec!["master".to_string()],
            pull_request_actions: vec![
                PullRequestAction::Opened,
                PullRequestAction::Synchronize,
                PullRequestAction::Reopened,
                PullRequestAction::ReadyForReview,
            ],
            paths: vec![
                ".github/workflows/rust.yml".to_string(),
                "src/**".to_string(),
                "tests/**".to_string(),
                "Cargo.toml".to_string(),
            ],
        }
    }
}

/// Why an event did not start a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Pull request is a draft.
    DraftPullRequest,
    /// Push went to a branch that is not watched.
    BranchNotWatched { branch: String },
    /// Pull-request action is not one of the watched actions.
    ActionNotWatched { action: PullRequestAction },
    /// No changed path matched the path filters.
    NoMatchingPaths,
}

/// Outcome of evaluating an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TriggerDecision {
    Run {
        /// Changed paths that matched a filter.
        matched_paths: Vec<String>,
    },
    Skip(SkipReason),
}

impl TriggerDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, Self::Run { .. })
    }
}

/// Compiled trigger rules.
#[derive(Debug, Clone)]
pub struct TriggerRules {
    push_branches: Vec<String>,
    pull_request_actions: Vec<PullRequestAction>,
    paths: Option<GlobSet>,
}

impl TriggerRules {
    /// Compile the path globs of a trigger section.
    ///
    /// `*` does not cross `/`; use `**` for recursive matches.
    pub fn compile(config: &TriggerConfig) -> Result<Self, CoreError> {
        let paths = if config.paths.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &config.paths {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| CoreError::InvalidPathFilter {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?;
                builder.add(glob);
            }
            let set = builder.build().map_err(|e| CoreError::InvalidPathFilter {
                pattern: config.paths.join(", "),
                message: e.to_string(),
            })?;
            Some(set)
        };

        Ok(Self {
            push_branches: config.push_branches.clone(),
            pull_request_actions: config.pull_request_actions.clone(),
            paths,
        })
    }

    /// Decide whether `event` starts a run.
    ///
    /// Drafts are rejected before anything else is looked at.
    pub fn evaluate(&self, event: &TriggerEvent) -> TriggerDecision {
        if event.is_draft() {
            return TriggerDecision::Skip(SkipReason::DraftPullRequest);
        }

        match event {
            TriggerEvent::Push { branch, .. } => {
                if !self.push_branches.iter().any(|b| b == branch) {
                    return TriggerDecision::Skip(SkipReason::BranchNotWatched {
                        branch: branch.clone(),
                    });
                }
            }
            TriggerEvent::PullRequest { action, .. } => {
                if !self.pull_request_actions.contains(action) {
                    return TriggerDecision::Skip(SkipReason::ActionNotWatched {
                        action: action.clone(),
                    });
                }
            }
        }

        let changed = event.changed_paths();
        let matched_paths: Vec<String> = match &self.paths {
            None => changed.to_vec(),
            Some(set) => changed
                .iter()
                .filter(|p| set.is_match(normalize(p)))
                .cloned()
                .collect(),
        };

        if self.paths.is_some() && matched_paths.is_empty() {
            return TriggerDecision::Skip(SkipReason::NoMatchingPaths);
        }

        TriggerDecision::Run { matched_paths }
    }
}

fn normalize(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}
