//! Orchestrator configuration.

use std::num::NonZeroUsize;

use crossgate_core::AggregationPolicy;

/// Orchestrator configuration.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Overrides the pipeline's aggregation policy.
    pub policy: Option<AggregationPolicy>,

    /// Maximum matrix jobs in flight. `None` dispatches every target at once.
    pub max_parallel: Option<NonZeroUsize>,
}
