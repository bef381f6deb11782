//! Run state - the single record threaded through one orchestration run
//!
//! Agent tasks never touch the state directly: they hand back a
//! [`StepUpdate`] and the orchestrator folds it in with
//! [`RunState::apply_update`]. Each agent owns one result key, so the
//! reducer is idempotent per agent and may run as tasks complete.

use crate::agents::{AgentKind, AgentOutput};
use crate::error::ErrorKind;
use crate::utils::AttemptFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Errors kept per agent before the oldest is dropped
pub const MAX_ERRORS_PER_AGENT: usize = 10;

/// Lifecycle of a plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started
    Pending,
    /// Dispatched to an agent task
    InProgress,
    /// Produced a result
    Completed,
    /// Ran and failed
    Failed,
    /// Will not run
    Skipped,
}

impl StepStatus {
    /// Canonical name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Completed, failed or skipped
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every requested analysis succeeded
    Completed,
    /// Some requested analyses succeeded
    Partial,
    /// None succeeded
    Failed,
    /// Stopped by the caller
    Cancelled,
}

impl RunStatus {
    /// Canonical name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scheduled agent execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique within the run (`risk`, `risk#2`, ...)
    pub step_id: String,
    /// Agent to run
    pub agent: AgentKind,
    /// Agents whose results must be present first
    pub dependencies: Vec<AgentKind>,
    /// Current status
    pub status: StepStatus,
    /// Why the step was skipped or substituted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PlanStep {
    /// Pending step for `agent` with the table's dependencies
    #[must_use]
    pub fn new(step_id: impl Into<String>, agent: AgentKind) -> Self {
        Self {
            step_id: step_id.into(),
            agent,
            dependencies: agent.dependencies().to_vec(),
            status: StepStatus::Pending,
            reason: None,
        }
    }

    /// Mark the step skipped
    #[must_use]
    pub fn skipped(mut self, reason: impl Into<String>) -> Self {
        self.status = StepStatus::Skipped;
        self.reason = Some(reason.into());
        self
    }
}

/// Ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Incremented on every replan
    pub version: u32,
    /// Steps in dependency order
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Step by id
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Mutable step by id
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }

    /// The pending step for `agent`, if any
    #[must_use]
    pub fn pending_step(&self, agent: AgentKind) -> Option<&PlanStep> {
        self.steps
            .iter()
            .find(|s| s.agent == agent && s.status == StepStatus::Pending)
    }

    /// Steps with the given status
    pub fn with_status(&self, status: StepStatus) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(move |s| s.status == status)
    }

    /// Whether `agent` still has a pending or running step
    #[must_use]
    pub fn is_scheduled(&self, agent: AgentKind) -> bool {
        self.steps.iter().any(|s| {
            s.agent == agent && matches!(s.status, StepStatus::Pending | StepStatus::InProgress)
        })
    }

    /// Number of steps for `agent`, including failed and skipped ones
    #[must_use]
    pub fn attempts_for(&self, agent: AgentKind) -> usize {
        self.steps.iter().filter(|s| s.agent == agent).count()
    }

    /// Agents in plan order, one entry per step
    #[must_use]
    pub fn agents(&self) -> Vec<AgentKind> {
        self.steps.iter().map(|s| s.agent).collect()
    }
}

/// One entry of the bounded error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Failing agent
    pub agent: AgentKind,
    /// Step that failed
    pub step_id: String,
    /// Attempt within the step
    pub attempt: u32,
    /// Classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// Record for one failed attempt
    #[must_use]
    pub fn from_attempt(agent: AgentKind, step_id: &str, failure: &AttemptFailure) -> Self {
        Self {
            agent,
            step_id: step_id.to_string(),
            attempt: failure.attempt,
            kind: failure.kind,
            message: failure.message.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// What a replan should do with failed steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanAction {
    /// Skip chronic failures, substitute the rest
    #[default]
    Revise,
    /// Substitute every failed step whose breaker is not open
    RetryFailed,
    /// Skip every failed step
    SkipFailed,
}

/// Why a replan was requested
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplanTrigger {
    /// Requested handling
    pub action: ReplanAction,
    /// Human-readable cause
    pub reason: String,
    /// Higher is more urgent
    pub priority: u8,
}

impl ReplanTrigger {
    /// Trigger with the default action
    #[must_use]
    pub fn new(reason: impl Into<String>, priority: u8) -> Self {
        Self {
            action: ReplanAction::Revise,
            reason: reason.into(),
            priority,
        }
    }

    /// Override the action
    #[must_use]
    pub fn with_action(mut self, action: ReplanAction) -> Self {
        self.action = action;
        self
    }
}

/// Audit entry for one replan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRecord {
    /// Plan before the replan
    pub old_plan: Plan,
    /// Plan after the replan
    pub new_plan: Plan,
    /// What caused it
    pub trigger: ReplanTrigger,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one agent task, folded into the state by the reducer
#[derive(Debug, Clone)]
pub struct StepUpdate {
    /// Agent that ran
    pub agent: AgentKind,
    /// Step that ran
    pub step_id: String,
    /// Result, when the step succeeded
    pub output: Option<AgentOutput>,
    /// Failed attempts, in order
    pub failures: Vec<AttemptFailure>,
}

impl StepUpdate {
    /// Successful step
    #[must_use]
    pub fn success(agent: AgentKind, step_id: impl Into<String>, output: AgentOutput) -> Self {
        Self {
            agent,
            step_id: step_id.into(),
            output: Some(output),
            failures: Vec::new(),
        }
    }

    /// Attach the attempts that failed before this outcome
    #[must_use]
    pub fn with_failures(mut self, failures: Vec<AttemptFailure>) -> Self {
        self.failures = failures;
        self
    }

    /// Failed step
    #[must_use]
    pub fn failure(
        agent: AgentKind,
        step_id: impl Into<String>,
        failures: Vec<AttemptFailure>,
    ) -> Self {
        Self {
            agent,
            step_id: step_id.into(),
            output: None,
            failures,
        }
    }

    /// Kind of the last failure
    #[must_use]
    pub fn final_kind(&self) -> Option<ErrorKind> {
        self.failures.last().map(|f| f.kind)
    }
}

/// What the reducer did with an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Result written
    Stored,
    /// Result already present, update ignored
    Duplicate,
    /// Errors appended (count)
    Failed(usize),
}

/// Mutable routing flags, part of the supervisor's cache key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RunFlags {
    /// Progress stalled on waits
    pub stalled: bool,
    /// Consecutive wait decisions
    pub consecutive_waits: u32,
    /// Errors appended since the last replan
    pub errors_since_replan: u32,
}

/// The shared record for one run
#[derive(Debug, Clone)]
pub struct RunState {
    /// Run identifier
    pub run_id: Uuid,
    /// Case under analysis
    pub case_id: String,
    /// Analyses the caller asked for
    pub requested: BTreeSet<AgentKind>,
    /// One result per agent, never overwritten
    pub results: BTreeMap<AgentKind, AgentOutput>,
    /// Completed step ids, append-only
    pub completed_steps: BTreeSet<String>,
    /// Bounded error log in arrival order
    pub errors: Vec<ErrorRecord>,
    /// Current plan
    pub plan: Plan,
    /// Replans performed
    pub replan_attempts: u32,
    /// When the last replan happened
    pub last_replan_at: Option<Instant>,
    /// Explicit replan request not yet handled
    pub pending_trigger: Option<ReplanTrigger>,
    /// Every replan, oldest first
    pub adaptation_history: Vec<AdaptationRecord>,
    /// Routing flags
    pub flags: RunFlags,
    /// Free-form side data, never read by routing
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RunState {
    /// Fresh state for a run
    #[must_use]
    pub fn new(
        run_id: Uuid,
        case_id: impl Into<String>,
        requested: BTreeSet<AgentKind>,
        plan: Plan,
    ) -> Self {
        Self {
            run_id,
            case_id: case_id.into(),
            requested,
            results: BTreeMap::new(),
            completed_steps: BTreeSet::new(),
            errors: Vec::new(),
            plan,
            replan_attempts: 0,
            last_replan_at: None,
            pending_trigger: None,
            adaptation_history: Vec::new(),
            flags: RunFlags::default(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Whether `agent` has a result
    #[must_use]
    pub fn has_result(&self, agent: AgentKind) -> bool {
        self.results.contains_key(&agent)
    }

    /// Every requested analysis has a result
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.requested.iter().all(|a| self.has_result(*a))
    }

    /// Dependencies of `agent` all have results
    #[must_use]
    pub fn dependencies_met(&self, agent: AgentKind) -> bool {
        agent.dependencies().iter().all(|d| self.has_result(*d))
    }

    /// Errors recorded for `agent`, oldest first
    pub fn errors_for(&self, agent: AgentKind) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter().filter(move |e| e.agent == agent)
    }

    /// Mark a step as dispatched
    pub fn mark_in_progress(&mut self, step_id: &str) {
        if let Some(step) = self.plan.step_mut(step_id) {
            step.status = StepStatus::InProgress;
        }
    }

    /// Fold one agent outcome into the state.
    ///
    /// A result is written only when the agent has none yet. Every failed
    /// attempt is logged once (keyed by step and attempt), including the
    /// ones a later retry recovered from; only failed steps count toward
    /// the replan error trigger. Failures arriving after the agent already
    /// has a result are dropped.
    pub fn apply_update(&mut self, update: StepUpdate) -> Applied {
        let StepUpdate {
            agent,
            step_id,
            output,
            failures,
        } = update;

        if let Some(output) = output {
            if let Some(step) = self.plan.step_mut(&step_id) {
                step.status = StepStatus::Completed;
            }
            self.completed_steps.insert(step_id.clone());
            self.log_failures(agent, &step_id, &failures);
            if self.results.contains_key(&agent) {
                debug!(agent = %agent, step_id = %step_id, "Result already present, keeping first");
                return Applied::Duplicate;
            }
            self.results.insert(agent, output);
            return Applied::Stored;
        }

        if let Some(step) = self.plan.step_mut(&step_id) {
            if step.status != StepStatus::Completed {
                step.status = StepStatus::Failed;
            }
        }
        if self.has_result(agent) {
            return Applied::Failed(0);
        }

        let appended = self.log_failures(agent, &step_id, &failures);
        self.flags.errors_since_replan += appended as u32;
        Applied::Failed(appended)
    }

    /// Append attempt failures not logged yet, returning how many were new
    fn log_failures(
        &mut self,
        agent: AgentKind,
        step_id: &str,
        failures: &[AttemptFailure],
    ) -> usize {
        let mut appended = 0;
        for failure in failures {
            let seen = self
                .errors
                .iter()
                .any(|e| e.agent == agent && e.step_id == step_id && e.attempt == failure.attempt);
            if seen {
                continue;
            }
            self.errors
                .push(ErrorRecord::from_attempt(agent, step_id, failure));
            appended += 1;
        }
        self.trim_errors(agent);
        appended
    }

    /// Append a single error record, bypassing attempt dedup
    pub fn record_error(&mut self, record: ErrorRecord) {
        let agent = record.agent;
        self.errors.push(record);
        self.trim_errors(agent);
    }

    fn trim_errors(&mut self, agent: AgentKind) {
        let count = self.errors.iter().filter(|e| e.agent == agent).count();
        let mut excess = count.saturating_sub(MAX_ERRORS_PER_AGENT);
        if excess == 0 {
            return;
        }
        self.errors.retain(|e| {
            if excess > 0 && e.agent == agent {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }

    /// Requested analyses that succeeded
    #[must_use]
    pub fn succeeded(&self) -> Vec<AgentKind> {
        self.requested
            .iter()
            .copied()
            .filter(|a| self.has_result(*a))
            .collect()
    }
}
