use crate::agents::{AgentKind, AgentOutput};
use crate::error::ErrorKind;
use crate::state::{Plan, RunStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Progress events emitted during a run.
///
/// Events carry agent results but never credentials or raw prompts.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A batch of agents was dispatched
    PhaseStarted {
        /// Run identifier
        run_id: Uuid,
        /// 1-based dispatch counter
        phase: u32,
        /// Agents in the batch
        agents: Vec<AgentKind>,
    },
    /// An agent produced its result
    StepCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Agent
        agent: AgentKind,
        /// Step that completed
        step_id: String,
        /// The result
        result: AgentOutput,
    },
    /// An agent gave up for this step
    StepFailed {
        /// Run identifier
        run_id: Uuid,
        /// Agent
        agent: AgentKind,
        /// Step that failed
        step_id: String,
        /// Last error message
        error: String,
        /// Classification of the last error
        kind: ErrorKind,
    },
    /// The plan was revised
    Replanned {
        /// Run identifier
        run_id: Uuid,
        /// Plan before
        old_plan: Plan,
        /// Plan after
        new_plan: Plan,
        /// Trigger reason
        reason: String,
    },
    /// The run finished
    RunCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Terminal status
        status: RunStatus,
        /// Results by agent
        results: BTreeMap<AgentKind, AgentOutput>,
    },
}

impl RunEvent {
    /// Run the event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::PhaseStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::Replanned { run_id, .. }
            | Self::RunCompleted { run_id, .. } => *run_id,
        }
    }

    /// Event name as serialized in `type`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PhaseStarted { .. } => "phase_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
            Self::Replanned { .. } => "replanned",
            Self::RunCompleted { .. } => "run_completed",
        }
    }

    /// Whether this is the last event of its run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. })
    }
}
