//! Fan-out / fan-in executor
//!
//! Dispatches a batch of runnable agents as concurrent tasks and folds
//! each outcome into the run state as soon as it arrives. Every attempt
//! goes through the agent's circuit breaker, the shared throttle and a
//! per-attempt deadline; retries follow the [`RetryPolicy`].

use crate::agents::{Agent, AgentContext, AgentKind, AgentOutput, AgentRegistry};
use crate::error::{Error, ErrorKind};
use crate::event_bus::{EventBus, RunEvent};
use crate::resilience::Resilience;
use crate::state::{Applied, RunState, StepUpdate};
use crate::utils::{retry_with_backoff, AttemptFailure, RetryPolicy};
use docket_llm::CostTracker;
use docket_tools::{Sensitivity, ToolRegistry};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// Outcome of one dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Agents whose steps were started
    pub dispatched: Vec<AgentKind>,
    /// Agents that produced a result, in completion order
    pub succeeded: Vec<AgentKind>,
    /// Agents that failed, in completion order
    pub failed: Vec<AgentKind>,
    /// The batch was interrupted by cancellation
    pub cancelled: bool,
}

/// Runs agent steps concurrently under the shared resilience state
#[derive(Clone)]
pub struct Executor {
    agents: AgentRegistry,
    resilience: Arc<Resilience>,
    tools: Arc<ToolRegistry>,
    costs: Arc<CostTracker>,
    retry: RetryPolicy,
    agent_timeouts: BTreeMap<AgentKind, Duration>,
    max_tool_sensitivity: Sensitivity,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("agents", &self.agents)
            .field("retry", &self.retry)
            .field("agent_timeouts", &self.agent_timeouts)
            .finish()
    }
}

impl Executor {
    /// Create an executor
    #[must_use]
    pub fn new(
        agents: AgentRegistry,
        resilience: Arc<Resilience>,
        tools: Arc<ToolRegistry>,
        costs: Arc<CostTracker>,
    ) -> Self {
        Self {
            agents,
            resilience,
            tools,
            costs,
            retry: RetryPolicy::default(),
            agent_timeouts: BTreeMap::new(),
            max_tool_sensitivity: Sensitivity::High,
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override per-agent deadlines
    #[must_use]
    pub fn with_agent_timeouts(mut self, timeouts: BTreeMap<AgentKind, Duration>) -> Self {
        self.agent_timeouts = timeouts;
        self
    }

    /// Set the highest tool sensitivity agents may use
    #[must_use]
    pub fn with_max_tool_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.max_tool_sensitivity = sensitivity;
        self
    }

    /// Registered agents
    #[must_use]
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Configured deadline for `agent`
    #[must_use]
    pub fn static_timeout(&self, agent: AgentKind) -> Duration {
        self.agent_timeouts
            .get(&agent)
            .copied()
            .unwrap_or_else(|| agent.spec().default_timeout)
    }

    /// Deadline for the next attempt: latency-derived once enough history
    /// exists, never above the configured one
    #[must_use]
    pub fn attempt_timeout(&self, agent: AgentKind) -> Duration {
        let configured = self.static_timeout(agent);
        self.resilience
            .timeouts
            .timeout_for(agent.as_str(), configured)
            .min(configured)
    }

    /// Run `agents` concurrently and merge their outcomes into `state`.
    ///
    /// Agents without a pending step or with missing dependency results
    /// are not dispatched. Step events are published in completion order.
    pub async fn run_batch(
        &self,
        state: &mut RunState,
        agents: &[AgentKind],
        bus: &EventBus,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut tasks = FuturesUnordered::new();

        for &agent in agents {
            let Some(step_id) = state.plan.pending_step(agent).map(|s| s.step_id.clone()) else {
                debug!(agent = %agent, "No pending step, not dispatching");
                continue;
            };
            if !state.dependencies_met(agent) {
                warn!(agent = %agent, step_id = %step_id, "Dependencies missing, not dispatching");
                continue;
            }

            let handler = match self.agents.get(agent) {
                Ok(handler) => handler,
                Err(e) => {
                    state.mark_in_progress(&step_id);
                    let update = StepUpdate::failure(
                        agent,
                        step_id,
                        vec![AttemptFailure {
                            attempt: 1,
                            kind: ErrorKind::Fatal,
                            message: e.to_string(),
                        }],
                    );
                    report.dispatched.push(agent);
                    report.failed.push(agent);
                    self.merge(state, update, bus);
                    continue;
                }
            };

            let dependencies = agent
                .dependencies()
                .iter()
                .filter_map(|d| state.results.get(d).map(|r| (*d, r.clone())))
                .collect();

            state.mark_in_progress(&step_id);
            report.dispatched.push(agent);
            info!(run_id = %state.run_id, agent = %agent, step_id = %step_id, "Dispatching step");

            let job = Job {
                agent,
                step_id: step_id.clone(),
                handler,
                context: AgentContext {
                    run_id: state.run_id,
                    case_id: state.case_id.clone(),
                    kind: agent,
                    attempt: 1,
                    dependencies,
                    tools: Arc::clone(&self.tools),
                    max_tool_sensitivity: self.max_tool_sensitivity,
                    costs: Arc::clone(&self.costs),
                },
                resilience: Arc::clone(&self.resilience),
                retry: self.retry.clone(),
                timeout: self.attempt_timeout(agent),
            };
            let handle = tokio::spawn(job.run(cancel.clone()));
            tasks.push(async move { (agent, step_id, handle.await) });
        }

        while let Some((agent, step_id, joined)) = tasks.next().await {
            let update = joined.unwrap_or_else(|e| {
                StepUpdate::failure(
                    agent,
                    step_id,
                    vec![AttemptFailure {
                        attempt: 1,
                        kind: ErrorKind::Transient,
                        message: Error::Internal(format!("agent task failed: {e}")).to_string(),
                    }],
                )
            });

            if update.final_kind() == Some(ErrorKind::Cancelled) {
                report.cancelled = true;
            }
            if update.output.is_some() {
                report.succeeded.push(agent);
            } else {
                report.failed.push(agent);
            }
            self.merge(state, update, bus);
        }

        report
    }

    fn merge(&self, state: &mut RunState, update: StepUpdate, bus: &EventBus) {
        let event = match (&update.output, update.failures.last()) {
            (Some(output), _) => RunEvent::StepCompleted {
                run_id: state.run_id,
                agent: update.agent,
                step_id: update.step_id.clone(),
                result: output.clone(),
            },
            (None, last) => RunEvent::StepFailed {
                run_id: state.run_id,
                agent: update.agent,
                step_id: update.step_id.clone(),
                error: last.map_or_else(|| "unknown failure".to_string(), |f| f.message.clone()),
                kind: last.map_or(ErrorKind::Transient, |f| f.kind),
            },
        };

        let agent = update.agent;
        match state.apply_update(update) {
            Applied::Stored => info!(run_id = %state.run_id, agent = %agent, "Step completed"),
            Applied::Duplicate => debug!(run_id = %state.run_id, agent = %agent, "Duplicate result ignored"),
            Applied::Failed(appended) => {
                warn!(run_id = %state.run_id, agent = %agent, errors = appended, "Step failed");
            }
        }
        bus.publish(event);
    }
}

/// Everything one spawned agent task owns
struct Job {
    agent: AgentKind,
    step_id: String,
    handler: Arc<dyn Agent>,
    context: AgentContext,
    resilience: Arc<Resilience>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Job {
    async fn run(self, cancel: CancellationToken) -> StepUpdate {
        let Job {
            agent,
            step_id,
            handler,
            context,
            resilience,
            retry,
            timeout,
        } = self;

        let breaker = resilience.breakers.get(agent.as_str());
        let current_attempt = AtomicU32::new(1);

        let work = retry_with_backoff(&retry, &breaker, |attempt| {
            current_attempt.store(attempt, Ordering::Relaxed);
            let ctx = AgentContext {
                attempt,
                ..context.clone()
            };
            let handler = Arc::clone(&handler);
            let resilience = Arc::clone(&resilience);
            async move {
                let started = Instant::now();
                let attempt_result = tokio::time::timeout(timeout, async {
                    let _permit = resilience.throttle.acquire().await?;
                    handler.run(&ctx).await
                })
                .await;

                match attempt_result {
                    Ok(Ok(mut output)) => {
                        resilience.timeouts.record(agent.as_str(), started.elapsed());
                        output.attempts = attempt;
                        Ok::<AgentOutput, Error>(output)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        warn!(agent = %agent, attempt, timeout_ms = timeout.as_millis() as u64, "Attempt timed out");
                        Err(Error::Timeout {
                            agent: agent.to_string(),
                            after_ms: timeout.as_millis() as u64,
                        })
                    }
                }
            }
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(agent = %agent, step_id = %step_id, "Step cancelled");
                StepUpdate::failure(
                    agent,
                    step_id,
                    vec![AttemptFailure {
                        attempt: current_attempt.load(Ordering::Relaxed),
                        kind: ErrorKind::Cancelled,
                        message: Error::Cancelled.to_string(),
                    }],
                )
            }
            outcome = work => match outcome.result {
                Ok(output) => {
                    StepUpdate::success(agent, step_id, output).with_failures(outcome.failures)
                }
                Err(_) => StepUpdate::failure(agent, step_id, outcome.failures),
            },
        }
    }
}
