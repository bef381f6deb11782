//! Orchestrator configuration

use crate::agents::AgentKind;
use crate::replanner::ReplanPolicy;
use crate::utils::RetryPolicy;
use docket_tools::Sensitivity;
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Agents dispatched together at most
    pub max_fan_out: usize,
    /// Retry policy for agent attempts
    pub retry: RetryPolicy,
    /// Replan guards
    pub replan: ReplanPolicy,
    /// Per-agent deadline overrides
    pub agent_timeouts: BTreeMap<AgentKind, Duration>,
    /// Deadline for a whole run
    pub run_deadline: Option<Duration>,
    /// Supervisor decision cache entries
    pub decision_cache_size: usize,
    /// Pause between checks while waiting on dependencies
    pub wait_poll_interval: Duration,
    /// Highest tool sensitivity agents may use
    pub max_tool_sensitivity: Sensitivity,
    /// Event buffer per subscriber
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_fan_out: 8,
            retry: RetryPolicy::default(),
            replan: ReplanPolicy::default(),
            agent_timeouts: BTreeMap::new(),
            run_deadline: None,
            decision_cache_size: 100,
            wait_poll_interval: Duration::from_secs(1),
            max_tool_sensitivity: Sensitivity::High,
            event_capacity: 256,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fan-out cap
    #[must_use]
    pub fn with_max_fan_out(mut self, max: usize) -> Self {
        self.max_fan_out = max;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the replan policy
    #[must_use]
    pub fn with_replan(mut self, replan: ReplanPolicy) -> Self {
        self.replan = replan;
        self
    }

    /// Override one agent's deadline
    #[must_use]
    pub fn with_agent_timeout(mut self, agent: AgentKind, timeout: Duration) -> Self {
        self.agent_timeouts.insert(agent, timeout);
        self
    }

    /// Set the run deadline
    #[must_use]
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    /// Set the decision cache size
    #[must_use]
    pub fn with_decision_cache_size(mut self, size: usize) -> Self {
        self.decision_cache_size = size;
        self
    }

    /// Set the wait poll interval
    #[must_use]
    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval = interval;
        self
    }

    /// Set the tool sensitivity ceiling
    #[must_use]
    pub fn with_max_tool_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.max_tool_sensitivity = sensitivity;
        self
    }

    /// Set the event buffer size
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}
