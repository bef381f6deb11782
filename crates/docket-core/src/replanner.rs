//! Replanner - bounded plan revision after errors or stalls
//!
//! A replan keeps completed work, skips agents that keep failing (and
//! everything downstream of them) and gives the remaining failed agents a
//! fresh step. Replans are capped per run, spaced by a cooldown and
//! recorded in the run's adaptation history.

use crate::agents::AgentKind;
use crate::error::ErrorKind;
use crate::state::{
    AdaptationRecord, PlanStep, ReplanAction, ReplanTrigger, RunState, StepStatus,
};
use crate::utils::CircuitBreakerRegistry;
use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

/// Replan limits
#[derive(Debug, Clone, PartialEq)]
pub struct ReplanPolicy {
    /// Replans allowed per run
    pub max_attempts: u32,
    /// Minimum spacing between replans
    pub cooldown: Duration,
    /// Completed steps required before the first replan
    pub min_completed: usize,
    /// Errors since the last replan that trigger a new one
    pub error_trigger: u32,
    /// Failed steps after which an agent is considered chronic
    pub max_step_failures: usize,
    /// Consecutive waits that mark the run stalled
    pub stall_threshold: u32,
}

impl Default for ReplanPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(60),
            min_completed: 2,
            error_trigger: 3,
            max_step_failures: 2,
            stall_threshold: 3,
        }
    }
}

impl ReplanPolicy {
    /// Default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set replans allowed per run
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set replan cooldown
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set completed steps required before the first replan
    #[must_use]
    pub fn with_min_completed(mut self, steps: usize) -> Self {
        self.min_completed = steps;
        self
    }

    /// Set the error trigger
    #[must_use]
    pub fn with_error_trigger(mut self, errors: u32) -> Self {
        self.error_trigger = errors;
        self
    }

    /// Set the chronic failure threshold
    #[must_use]
    pub fn with_max_step_failures(mut self, failures: usize) -> Self {
        self.max_step_failures = failures;
        self
    }

    /// Set the stall threshold
    #[must_use]
    pub fn with_stall_threshold(mut self, waits: u32) -> Self {
        self.stall_threshold = waits;
        self
    }
}

/// Whether a replan may happen now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplanAvailability {
    /// Guards pass
    Available,
    /// Inside the cooldown after the previous replan
    CoolingDown,
    /// Not enough completed steps for the first replan
    TooEarly,
    /// Attempt budget spent
    Exhausted,
}

/// Applies [`ReplanPolicy`] to run state
#[derive(Debug, Clone, Default)]
pub struct Replanner {
    policy: ReplanPolicy,
}

impl Replanner {
    /// Create a replanner
    #[must_use]
    pub fn new(policy: ReplanPolicy) -> Self {
        Self { policy }
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &ReplanPolicy {
        &self.policy
    }

    /// Evaluate the guards at `now`
    #[must_use]
    pub fn availability(&self, state: &RunState, now: Instant) -> ReplanAvailability {
        if state.replan_attempts >= self.policy.max_attempts {
            return ReplanAvailability::Exhausted;
        }
        if state.replan_attempts == 0 && state.completed_steps.len() < self.policy.min_completed {
            return ReplanAvailability::TooEarly;
        }
        match state.last_replan_at {
            Some(last) if now.saturating_duration_since(last) < self.policy.cooldown => {
                ReplanAvailability::CoolingDown
            }
            _ => ReplanAvailability::Available,
        }
    }

    /// Explicit trigger, else one inferred from errors or a stall
    #[must_use]
    pub fn trigger(&self, state: &RunState) -> Option<ReplanTrigger> {
        if let Some(trigger) = &state.pending_trigger {
            return Some(trigger.clone());
        }
        if state.flags.errors_since_replan >= self.policy.error_trigger {
            return Some(ReplanTrigger::new(
                format!(
                    "{} errors since last plan",
                    state.flags.errors_since_replan
                ),
                2,
            ));
        }
        if state.flags.stalled {
            return Some(ReplanTrigger::new("no progress", 1));
        }
        None
    }

    /// Agent failing often enough that another step is pointless
    fn is_chronic(
        &self,
        state: &RunState,
        agent: AgentKind,
        breakers: &CircuitBreakerRegistry,
    ) -> Option<String> {
        if breakers.is_open(agent.as_str()) {
            return Some("circuit open".to_string());
        }
        if let Some(last) = state.errors_for(agent).last() {
            if matches!(last.kind, ErrorKind::Fatal | ErrorKind::CircuitOpen) {
                return Some(format!("{} error: {}", last.kind, last.message));
            }
        }
        let failed = state
            .plan
            .steps
            .iter()
            .filter(|s| s.agent == agent && s.status == StepStatus::Failed)
            .count();
        (failed >= self.policy.max_step_failures).then(|| format!("failed {failed} times"))
    }

    /// Revise the plan if the guards allow it.
    ///
    /// Returns the appended adaptation record, or `None` when refused.
    pub fn replan<'a>(
        &self,
        state: &'a mut RunState,
        trigger: ReplanTrigger,
        breakers: &CircuitBreakerRegistry,
        now: Instant,
    ) -> Option<&'a AdaptationRecord> {
        let availability = self.availability(state, now);
        if availability != ReplanAvailability::Available {
            warn!(run_id = %state.run_id, ?availability, reason = %trigger.reason, "Replan refused");
            return None;
        }

        let old_plan = state.plan.clone();
        let mut new_plan = old_plan.clone();
        new_plan.version += 1;

        let failed_agents: BTreeSet<AgentKind> = old_plan
            .with_status(StepStatus::Failed)
            .map(|s| s.agent)
            .filter(|a| !state.has_result(*a) && !old_plan.is_scheduled(*a))
            .collect();

        let mut unavailable = BTreeSet::new();
        for agent in failed_agents {
            let skip_reason = match trigger.action {
                ReplanAction::SkipFailed => Some("skipped on request".to_string()),
                ReplanAction::RetryFailed => breakers
                    .is_open(agent.as_str())
                    .then(|| "circuit open".to_string()),
                ReplanAction::Revise => self.is_chronic(state, agent, breakers),
            };

            match skip_reason {
                Some(reason) => {
                    for step in new_plan.steps.iter_mut().filter(|s| {
                        s.agent == agent && s.status == StepStatus::Failed
                    }) {
                        step.status = StepStatus::Skipped;
                        step.reason = Some(reason.clone());
                    }
                    info!(run_id = %state.run_id, agent = %agent, reason = %reason, "Skipping agent");
                    unavailable.insert(agent);
                }
                None => {
                    let step_id = format!("{}#{}", agent, new_plan.attempts_for(agent) + 1);
                    let position = new_plan
                        .steps
                        .iter()
                        .rposition(|s| s.agent == agent)
                        .map_or(new_plan.steps.len(), |p| p + 1);
                    let mut step = PlanStep::new(step_id.clone(), agent);
                    step.reason = Some(format!("substitute after failure ({})", trigger.reason));
                    new_plan.steps.insert(position, step);
                    info!(run_id = %state.run_id, agent = %agent, step_id = %step_id, "Substituting step");
                }
            }
        }

        // Skip everything downstream of an unavailable agent
        loop {
            let mut changed = false;
            for step in new_plan
                .steps
                .iter_mut()
                .filter(|s| s.status == StepStatus::Pending)
            {
                if let Some(dep) = step.dependencies.iter().find(|d| unavailable.contains(*d)) {
                    step.status = StepStatus::Skipped;
                    step.reason = Some(format!("dependency {dep} unavailable"));
                    unavailable.insert(step.agent);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        state.plan = new_plan.clone();
        state.replan_attempts += 1;
        state.last_replan_at = Some(now);
        state.pending_trigger = None;
        state.flags.errors_since_replan = 0;
        state.flags.stalled = false;
        state.flags.consecutive_waits = 0;

        info!(
            run_id = %state.run_id,
            attempt = state.replan_attempts,
            version = new_plan.version,
            reason = %trigger.reason,
            "Plan revised"
        );

        state.adaptation_history.push(AdaptationRecord {
            old_plan,
            new_plan,
            trigger,
            timestamp: Utc::now(),
        });
        state.adaptation_history.last()
    }
}
