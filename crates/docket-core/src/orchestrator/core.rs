//! Orchestrator struct and operational queries

use super::config::OrchestratorConfig;
use crate::agents::{AgentKind, AgentRegistry};
use crate::event_bus::EventBus;
use crate::executor::Executor;
use crate::replanner::Replanner;
use crate::resilience::{self, Resilience};
use crate::supervisor::{CacheStats, Supervisor};
use crate::utils::CircuitBreakerStats;
use dashmap::DashMap;
use docket_llm::{global_tracker, CostSummary, CostTracker};
use docket_tools::ToolRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Drives analysis runs over a registry of agents.
///
/// Cloning is cheap; clones share breakers, caches, the event bus and the
/// table of active runs.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) agents: AgentRegistry,
    pub(crate) supervisor: Arc<Supervisor>,
    pub(crate) resilience: Arc<Resilience>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) costs: Arc<CostTracker>,
    pub(crate) event_bus: Arc<EventBus>,
    /// Cancellation tokens of runs still in flight
    pub(crate) active_runs: Arc<DashMap<Uuid, CancellationToken>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("agents", &self.agents)
            .field("active_runs", &self.active_runs.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator using the process-wide resilience bundle and
    /// cost tracker, with no tools registered
    #[must_use]
    pub fn new(agents: AgentRegistry, config: OrchestratorConfig) -> Self {
        let supervisor = Supervisor::new(
            Replanner::new(config.replan.clone()),
            config.max_fan_out,
            config.decision_cache_size,
        );
        let event_bus = EventBus::new(config.event_capacity);
        Self {
            config,
            agents,
            supervisor: Arc::new(supervisor),
            resilience: resilience::global(),
            tools: Arc::new(ToolRegistry::new()),
            costs: global_tracker(),
            event_bus: Arc::new(event_bus),
            active_runs: Arc::new(DashMap::new()),
        }
    }

    /// Use a dedicated resilience bundle
    #[must_use]
    pub fn with_resilience(mut self, resilience: Arc<Resilience>) -> Self {
        self.resilience = resilience;
        self
    }

    /// Set the tool registry agents call into
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Use a dedicated cost tracker
    #[must_use]
    pub fn with_cost_tracker(mut self, costs: Arc<CostTracker>) -> Self {
        self.costs = costs;
        self
    }

    /// Share an event bus with other components
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Event bus all runs publish on
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Tool registry
    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Executor configured for the next batch
    pub(crate) fn executor(&self) -> Executor {
        Executor::new(
            self.agents.clone(),
            Arc::clone(&self.resilience),
            Arc::clone(&self.tools),
            Arc::clone(&self.costs),
        )
        .with_retry(self.config.retry.clone())
        .with_agent_timeouts(self.config.agent_timeouts.clone())
        .with_max_tool_sensitivity(self.config.max_tool_sensitivity)
    }

    /// Breaker state for one agent, or all of them
    #[must_use]
    pub fn breaker_stats(&self, agent: Option<AgentKind>) -> Vec<CircuitBreakerStats> {
        self.resilience
            .breakers
            .stats(agent.as_ref().map(AgentKind::as_str))
    }

    /// LLM and tool spend, for one run or overall
    pub async fn cost_summary(&self, run_id: Option<Uuid>) -> CostSummary {
        let run_id = run_id.map(|id| id.to_string());
        self.costs.summary(run_id.as_deref()).await
    }

    /// Supervisor decision cache counters
    #[must_use]
    pub fn decision_cache_stats(&self) -> CacheStats {
        self.supervisor.cache_stats()
    }

    /// Ids of runs still in flight
    #[must_use]
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.active_runs.iter().map(|e| *e.key()).collect()
    }

    /// Cancel a run in flight.
    ///
    /// Returns `false` when the run is unknown or already finished.
    pub fn cancel_run(&self, run_id: Uuid) -> bool {
        if let Some((_, token)) = self.active_runs.remove(&run_id) {
            token.cancel();
            info!(run_id = %run_id, "Run cancellation requested");
            true
        } else {
            false
        }
    }
}
