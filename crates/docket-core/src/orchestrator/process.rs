//! The run loop: decide, dispatch, fold, adapt

use super::core::Orchestrator;
use super::handle::{RunHandle, RunReport};
use crate::agents::parse_analyses;
use crate::error::{ErrorKind, Result};
use crate::event_bus::RunEvent;
use crate::planner::{build_plan, dependency_closure};
use crate::state::{ErrorRecord, ReplanTrigger, RunState, RunStatus, StepStatus};
use crate::supervisor::Action;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Finished,
    Cancelled,
    Deadline,
}

impl Orchestrator {
    /// Validate the request, build the plan and start the run.
    ///
    /// Unknown analysis names, an empty request or a missing handler are
    /// rejected here, before anything runs.
    pub fn start_run<S: AsRef<str>>(&self, case_id: &str, analyses: &[S]) -> Result<RunHandle> {
        let requested = parse_analyses(analyses)?;
        self.agents.ensure_all(&dependency_closure(&requested))?;
        let plan = build_plan(&requested)?;

        let run_id = Uuid::new_v4();
        let state = RunState::new(run_id, case_id, requested, plan);
        let cancel = CancellationToken::new();
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let events = self.event_bus.subscribe();
        self.active_runs.insert(run_id, cancel.clone());

        info!(
            run_id = %run_id,
            case_id = %case_id,
            steps = state.plan.steps.len(),
            "Starting run"
        );

        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.drive(state, token, trigger_rx).await });

        Ok(RunHandle {
            run_id,
            events,
            cancel,
            triggers: trigger_tx,
            task,
        })
    }

    /// Start a run and wait for its report
    pub async fn run<S: AsRef<str>>(&self, case_id: &str, analyses: &[S]) -> Result<RunReport> {
        self.start_run(case_id, analyses)?.wait().await
    }

    #[instrument(skip_all, fields(run_id = %state.run_id, case_id = %state.case_id))]
    async fn drive(
        &self,
        mut state: RunState,
        cancel: CancellationToken,
        mut triggers: mpsc::UnboundedReceiver<ReplanTrigger>,
    ) -> RunReport {
        let started = Instant::now();
        let executor = self.executor();

        // Fires on user cancellation or when the run deadline passes
        let stop = cancel.child_token();
        let deadline_timer = self.config.run_deadline.map(|deadline| {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                stop.cancel();
            })
        });

        let mut phase = 0u32;
        let reason = loop {
            while let Ok(trigger) = triggers.try_recv() {
                let keep = state
                    .pending_trigger
                    .as_ref()
                    .is_none_or(|current| trigger.priority >= current.priority);
                if keep {
                    debug!(reason = %trigger.reason, "Replan requested");
                    state.pending_trigger = Some(trigger);
                }
            }

            if stop.is_cancelled() {
                break if cancel.is_cancelled() {
                    Stop::Cancelled
                } else {
                    Stop::Deadline
                };
            }

            let action = self.supervisor.decide(&state, Instant::now());
            self.supervisor.observe(&mut state, &action);
            debug!(action = %action, "Supervisor decision");

            match action {
                Action::Terminate => break Stop::Finished,
                Action::RunAgent(_) | Action::FanOut(_) => {
                    let agents = action.agents();
                    phase += 1;
                    self.event_bus.publish(RunEvent::PhaseStarted {
                        run_id: state.run_id,
                        phase,
                        agents: agents.clone(),
                    });
                    let report = executor
                        .run_batch(&mut state, &agents, &self.event_bus, &stop)
                        .await;
                    if report.dispatched.is_empty() {
                        warn!(?agents, "Nothing dispatched, stopping");
                        break Stop::Finished;
                    }
                }
                Action::WaitForDependency => {
                    tokio::select! {
                        () = stop.cancelled() => {}
                        () = tokio::time::sleep(self.config.wait_poll_interval) => {}
                    }
                }
                Action::Replan(trigger) => {
                    let reason = trigger.reason.clone();
                    let replanner = self.supervisor.replanner();
                    let record = replanner
                        .replan(&mut state, trigger, &self.resilience.breakers, Instant::now())
                        .cloned();
                    match record {
                        Some(record) => {
                            self.event_bus.publish(RunEvent::Replanned {
                                run_id: state.run_id,
                                old_plan: record.old_plan,
                                new_plan: record.new_plan,
                                reason,
                            });
                        }
                        None => {
                            // Guards changed between decide and replan
                            state.pending_trigger = None;
                        }
                    }
                }
            }
        };

        if let Some(timer) = deadline_timer {
            timer.abort();
        }
        self.active_runs.remove(&state.run_id);

        let status = self.finalize(&mut state, reason).await;
        self.event_bus.publish(RunEvent::RunCompleted {
            run_id: state.run_id,
            status,
            results: state.results.clone(),
        });

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            status = %status,
            succeeded = state.succeeded().len(),
            requested = state.requested.len(),
            replans = state.replan_attempts,
            duration_ms,
            "Run finished"
        );

        RunReport {
            run_id: state.run_id,
            case_id: state.case_id,
            status,
            requested: state.requested,
            results: state.results,
            errors: state.errors,
            plan: state.plan,
            adaptation_history: state.adaptation_history,
            phases: phase,
            duration_ms,
            metadata: state.metadata,
        }
    }

    /// Close out unfinished steps and derive the terminal status
    async fn finalize(&self, state: &mut RunState, stop: Stop) -> RunStatus {
        let (note, kind) = match stop {
            Stop::Finished => ("not reached", ErrorKind::Fatal),
            Stop::Cancelled => ("run cancelled", ErrorKind::Cancelled),
            Stop::Deadline => ("run deadline reached", ErrorKind::Cancelled),
        };

        for step in state
            .plan
            .steps
            .iter_mut()
            .filter(|s| matches!(s.status, StepStatus::Pending | StepStatus::InProgress))
        {
            step.status = StepStatus::Skipped;
            step.reason.get_or_insert_with(|| note.to_string());
        }

        let missing: Vec<_> = state
            .requested
            .iter()
            .copied()
            .filter(|a| !state.has_result(*a) && state.errors_for(*a).next().is_none())
            .collect();
        for agent in missing {
            let step = state.plan.steps.iter().rev().find(|s| s.agent == agent);
            let message = step
                .and_then(|s| s.reason.clone())
                .unwrap_or_else(|| note.to_string());
            let step_id = step.map_or_else(|| agent.to_string(), |s| s.step_id.clone());
            state.record_error(ErrorRecord {
                agent,
                step_id,
                attempt: 0,
                kind,
                message: format!("{agent} skipped: {message}"),
                timestamp: Utc::now(),
            });
        }

        let succeeded = state.succeeded().len();
        let status = if stop == Stop::Cancelled {
            RunStatus::Cancelled
        } else if succeeded == state.requested.len() {
            RunStatus::Completed
        } else if succeeded > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };

        let costs = self.costs.summary(Some(&state.run_id.to_string())).await;
        state
            .metadata
            .insert("total_cost".to_string(), serde_json::json!(costs.total_cost));
        state
            .metadata
            .insert("total_tokens".to_string(), serde_json::json!(costs.total_tokens));
        if stop == Stop::Deadline {
            state
                .metadata
                .insert("deadline_exceeded".to_string(), serde_json::Value::Bool(true));
        }

        status
    }
}
