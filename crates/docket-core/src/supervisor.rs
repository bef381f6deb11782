//! Supervisor - routing decisions over run state
//!
//! [`Supervisor::decide`] maps the routing-relevant part of a run's state
//! to the next [`Action`]. Decisions are memoised in an LRU keyed by a
//! SHA-256 digest of exactly those fields, so re-evaluating an unchanged
//! state is a cache hit.

use crate::agents::AgentKind;
use crate::planner::runnable_steps;
use crate::replanner::{ReplanAvailability, Replanner};
use crate::state::{ReplanTrigger, RunState, StepStatus};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
mod tests;

/// Next step for the orchestrator loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum Action {
    /// Run a single agent
    RunAgent(AgentKind),
    /// Run several independent agents concurrently
    FanOut(Vec<AgentKind>),
    /// Nothing runnable yet; check again later
    WaitForDependency,
    /// Revise the plan
    Replan(ReplanTrigger),
    /// Stop the run
    Terminate,
}

impl Action {
    /// Short name for logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunAgent(_) => "run_agent",
            Self::FanOut(_) => "fan_out",
            Self::WaitForDependency => "wait_for_dependency",
            Self::Replan(_) => "replan",
            Self::Terminate => "terminate",
        }
    }

    /// Agents to dispatch, if any
    #[must_use]
    pub fn agents(&self) -> Vec<AgentKind> {
        match self {
            Self::RunAgent(agent) => vec![*agent],
            Self::FanOut(agents) => agents.clone(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decision cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cached decisions reused
    pub hits: u64,
    /// Decisions computed
    pub misses: u64,
    /// Entries currently cached
    pub entries: usize,
}

/// Routing policy plus decision cache
#[derive(Debug)]
pub struct Supervisor {
    replanner: Replanner,
    max_fan_out: usize,
    cache: Mutex<LruCache<[u8; 32], Action>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Supervisor {
    /// Create a supervisor
    #[must_use]
    pub fn new(replanner: Replanner, max_fan_out: usize, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            replanner,
            max_fan_out: max_fan_out.max(1),
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Replanner the supervisor consults
    #[must_use]
    pub fn replanner(&self) -> &Replanner {
        &self.replanner
    }

    /// Decide the next action for `state` at `now`
    pub fn decide(&self, state: &RunState, now: Instant) -> Action {
        let availability = self.replanner.availability(state, now);
        let key = routing_digest(state, availability);

        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(action) = cache.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return action.clone();
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let action = self.route(state, availability);
        debug!(run_id = %state.run_id, action = %action, ?availability, "Routing decision");

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, action.clone());
        action
    }

    fn route(&self, state: &RunState, availability: ReplanAvailability) -> Action {
        if state.is_complete() {
            return Action::Terminate;
        }

        let can_replan = availability == ReplanAvailability::Available;
        if can_replan {
            if let Some(trigger) = self.replanner.trigger(state) {
                return Action::Replan(trigger);
            }
        }

        let mut runnable: Vec<AgentKind> = runnable_steps(state).iter().map(|s| s.agent).collect();
        runnable.truncate(self.max_fan_out);
        match runnable.len() {
            0 => {}
            1 => return Action::RunAgent(runnable[0]),
            _ => return Action::FanOut(runnable),
        }

        let blocked_on = state
            .plan
            .with_status(StepStatus::Pending)
            .flat_map(|s| s.dependencies.iter())
            .find(|d| !state.has_result(**d) && !state.plan.is_scheduled(**d));
        if let Some(dependency) = blocked_on {
            match availability {
                ReplanAvailability::Available => {
                    return Action::Replan(ReplanTrigger::new(
                        format!("dependency {dependency} failed"),
                        3,
                    ));
                }
                ReplanAvailability::CoolingDown => return Action::WaitForDependency,
                ReplanAvailability::TooEarly | ReplanAvailability::Exhausted => {}
            }
        }

        if state.plan.with_status(StepStatus::InProgress).next().is_some() {
            return Action::WaitForDependency;
        }

        Action::Terminate
    }

    /// Update wait and stall flags after `action` was chosen
    pub fn observe(&self, state: &mut RunState, action: &Action) {
        match action {
            Action::WaitForDependency => {
                state.flags.consecutive_waits += 1;
                if state.flags.consecutive_waits >= self.replanner.policy().stall_threshold
                    && !state.flags.stalled
                {
                    debug!(run_id = %state.run_id, waits = state.flags.consecutive_waits, "Run stalled");
                    state.flags.stalled = true;
                }
            }
            Action::RunAgent(_) | Action::FanOut(_) => {
                state.flags.consecutive_waits = 0;
                state.flags.stalled = false;
            }
            Action::Replan(_) | Action::Terminate => {}
        }
    }

    /// Cache counters
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.cache.lock().unwrap_or_else(|e| e.into_inner()).len();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }
}

/// Digest of every state field routing reads
fn routing_digest(state: &RunState, availability: ReplanAvailability) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(b"requested:");
    for agent in &state.requested {
        hasher.update(agent.as_str());
        hasher.update(b",");
    }
    hasher.update(b"|results:");
    for agent in state.results.keys() {
        hasher.update(agent.as_str());
        hasher.update(b",");
    }
    hasher.update(b"|completed:");
    for step in &state.completed_steps {
        hasher.update(step.as_bytes());
        hasher.update(b",");
    }
    hasher.update(format!("|plan:{}:", state.plan.version));
    for step in &state.plan.steps {
        hasher.update(format!("{}={};", step.step_id, step.status));
    }
    hasher.update(format!(
        "|flags:{}:{}|replan:{:?}",
        state.flags.stalled, state.flags.errors_since_replan, availability
    ));
    if let Some(trigger) = &state.pending_trigger {
        hasher.update(format!(
            "|trigger:{:?}:{}:{}",
            trigger.action, trigger.priority, trigger.reason
        ));
    }

    hasher.finalize().into()
}
