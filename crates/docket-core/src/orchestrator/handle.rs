//! Run handles and final reports

use crate::agents::{AgentKind, AgentOutput};
use crate::error::{Error, Result};
use crate::event_bus::RunEvent;
use crate::state::{AdaptationRecord, ErrorRecord, Plan, ReplanTrigger, RunStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Final state of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Case analysed
    pub case_id: String,
    /// Terminal status
    pub status: RunStatus,
    /// Analyses asked for
    pub requested: BTreeSet<AgentKind>,
    /// Results by agent, dependencies included
    pub results: BTreeMap<AgentKind, AgentOutput>,
    /// Bounded error log
    pub errors: Vec<ErrorRecord>,
    /// Plan as it stood at the end
    pub plan: Plan,
    /// Every replan, oldest first
    pub adaptation_history: Vec<AdaptationRecord>,
    /// Batches dispatched
    pub phases: u32,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Side data such as cost totals
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RunReport {
    /// Requested analyses that produced a result
    #[must_use]
    pub fn succeeded(&self) -> Vec<AgentKind> {
        self.requested
            .iter()
            .copied()
            .filter(|a| self.results.contains_key(a))
            .collect()
    }

    /// Requested analyses that did not
    #[must_use]
    pub fn missing(&self) -> Vec<AgentKind> {
        self.requested
            .iter()
            .copied()
            .filter(|a| !self.results.contains_key(a))
            .collect()
    }
}

/// Caller's handle on a run in flight
#[derive(Debug)]
pub struct RunHandle {
    pub(crate) run_id: Uuid,
    pub(crate) events: broadcast::Receiver<RunEvent>,
    pub(crate) cancel: CancellationToken,
    pub(crate) triggers: mpsc::UnboundedSender<ReplanTrigger>,
    pub(crate) task: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Run identifier
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stop the run. In-flight agents are interrupted and the report
    /// comes back with status `cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run, for use alongside `next_event`
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask for a replan at the next supervisor decision.
    ///
    /// Returns `false` once the run has finished.
    pub fn request_replan(&self, trigger: ReplanTrigger) -> bool {
        self.triggers.send(trigger).is_ok()
    }

    /// Next event of this run, `None` once the bus is closed.
    ///
    /// Events of other runs on a shared bus are skipped.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.run_id() == self.run_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(run_id = %self.run_id, skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunReport> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("run task failed: {e}")))
    }
}
