use super::*;
use crate::agents::AgentOutput;
use crate::error::ErrorKind;
use crate::planner::build_plan;
use crate::replanner::ReplanPolicy;
use crate::state::StepUpdate;
use crate::utils::{AttemptFailure, CircuitBreakerConfig, CircuitBreakerRegistry};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

fn state_for(requested: &[AgentKind]) -> RunState {
    let requested: BTreeSet<AgentKind> = requested.iter().copied().collect();
    let plan = build_plan(&requested).unwrap();
    RunState::new(Uuid::new_v4(), "case-1", requested, plan)
}

fn supervisor() -> Supervisor {
    Supervisor::new(Replanner::default(), 8, 100)
}

fn succeed(state: &mut RunState, agent: AgentKind) {
    let step_id = state
        .plan
        .steps
        .iter()
        .rev()
        .find(|s| s.agent == agent)
        .map(|s| s.step_id.clone())
        .unwrap_or_else(|| agent.as_str().to_string());
    state.apply_update(StepUpdate::success(agent, step_id, AgentOutput::text("ok")));
}

fn fail(state: &mut RunState, agent: AgentKind, attempts: u32) {
    let failures = (1..=attempts)
        .map(|attempt| AttemptFailure {
            attempt,
            kind: ErrorKind::Transient,
            message: "503 unavailable".to_string(),
        })
        .collect();
    state.apply_update(StepUpdate::failure(agent, agent.as_str(), failures));
}

/// Scenario C: independent agents go out together
#[tokio::test(start_paused = true)]
async fn test_independent_agents_fan_out() {
    let state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Discrepancy]);
    let action = supervisor().decide(&state, Instant::now());
    assert_eq!(
        action,
        Action::FanOut(vec![
            AgentKind::KeyFacts,
            AgentKind::Timeline,
            AgentKind::Discrepancy,
        ])
    );
}

/// Scenario A: risk waits for discrepancy
#[tokio::test(start_paused = true)]
async fn test_dependency_runs_first() {
    let supervisor = supervisor();
    let mut state = state_for(&[AgentKind::Risk]);
    assert_eq!(
        supervisor.decide(&state, Instant::now()),
        Action::RunAgent(AgentKind::Discrepancy)
    );

    succeed(&mut state, AgentKind::Discrepancy);
    assert_eq!(
        supervisor.decide(&state, Instant::now()),
        Action::RunAgent(AgentKind::Risk)
    );

    succeed(&mut state, AgentKind::Risk);
    assert_eq!(supervisor.decide(&state, Instant::now()), Action::Terminate);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_capped_by_priority() {
    let supervisor = Supervisor::new(Replanner::default(), 2, 100);
    let state = state_for(&[
        AgentKind::Summary,
        AgentKind::Timeline,
        AgentKind::Classification,
        AgentKind::PrivilegeCheck,
    ]);
    assert_eq!(
        supervisor.decide(&state, Instant::now()),
        Action::FanOut(vec![AgentKind::Classification, AgentKind::PrivilegeCheck])
    );
}

#[tokio::test(start_paused = true)]
async fn test_errors_trigger_replan() {
    let supervisor = supervisor();
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Risk]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);
    fail(&mut state, AgentKind::Discrepancy, 3);

    match supervisor.decide(&state, Instant::now()) {
        Action::Replan(trigger) => assert!(trigger.reason.contains("errors")),
        other => panic!("expected replan, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_dependency_without_replan_terminates() {
    let supervisor = supervisor();
    let mut state = state_for(&[AgentKind::Risk]);
    fail(&mut state, AgentKind::Discrepancy, 1);

    // Only one step ever ran, so the first replan is not yet permitted
    assert_eq!(supervisor.decide(&state, Instant::now()), Action::Terminate);
}

#[tokio::test(start_paused = true)]
async fn test_failed_dependency_replans_then_waits_for_cooldown() {
    let supervisor = supervisor();
    let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Summary]);
    succeed(&mut state, AgentKind::Timeline);
    fail(&mut state, AgentKind::KeyFacts, 1);
    succeed(&mut state, AgentKind::Classification);

    let action = supervisor.decide(&state, Instant::now());
    let Action::Replan(trigger) = action else {
        panic!("expected replan, got {action:?}");
    };
    assert_eq!(trigger.reason, "dependency key_facts failed");
    supervisor
        .replanner()
        .replan(&mut state, trigger, &registry, Instant::now())
        .unwrap();
    assert_eq!(
        supervisor.decide(&state, Instant::now()),
        Action::RunAgent(AgentKind::KeyFacts)
    );

    // The substitute fails too; the next replan is cooling down
    let step_id = state.plan.pending_step(AgentKind::KeyFacts).unwrap().step_id.clone();
    state.mark_in_progress(&step_id);
    state.apply_update(StepUpdate::failure(
        AgentKind::KeyFacts,
        step_id,
        vec![AttemptFailure {
            attempt: 1,
            kind: ErrorKind::Transient,
            message: "503".to_string(),
        }],
    ));
    assert_eq!(
        supervisor.decide(&state, Instant::now()),
        Action::WaitForDependency
    );

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(matches!(
        supervisor.decide(&state, Instant::now()),
        Action::Replan(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_replans_terminate() {
    let supervisor = Supervisor::new(
        Replanner::new(ReplanPolicy::default().with_max_attempts(0)),
        8,
        100,
    );
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Risk]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);
    fail(&mut state, AgentKind::Discrepancy, 3);
    state.flags.stalled = true;

    assert_eq!(supervisor.decide(&state, Instant::now()), Action::Terminate);
}

#[tokio::test(start_paused = true)]
async fn test_in_progress_steps_wait() {
    let supervisor = supervisor();
    let mut state = state_for(&[AgentKind::Timeline]);
    state.mark_in_progress("timeline");
    assert_eq!(
        supervisor.decide(&state, Instant::now()),
        Action::WaitForDependency
    );
}

#[tokio::test(start_paused = true)]
async fn test_decisions_are_cached() {
    let supervisor = supervisor();
    let state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts]);

    let first = supervisor.decide(&state, Instant::now());
    let second = supervisor.decide(&state, Instant::now());
    assert_eq!(first, second);

    // A different run with the same routing state shares the entry
    let other = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts]);
    supervisor.decide(&other, Instant::now());

    let stats = supervisor.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_is_bounded() {
    let supervisor = Supervisor::new(Replanner::default(), 8, 3);
    for agent in [
        AgentKind::Timeline,
        AgentKind::KeyFacts,
        AgentKind::Risk,
        AgentKind::Summary,
        AgentKind::Classification,
    ] {
        supervisor.decide(&state_for(&[agent]), Instant::now());
    }
    assert_eq!(supervisor.cache_stats().entries, 3);
}

#[test]
fn test_observe_marks_stall() {
    let supervisor = Supervisor::new(
        Replanner::new(ReplanPolicy::default().with_stall_threshold(2)),
        8,
        100,
    );
    let mut state = state_for(&[AgentKind::Timeline]);

    supervisor.observe(&mut state, &Action::WaitForDependency);
    assert!(!state.flags.stalled);
    supervisor.observe(&mut state, &Action::WaitForDependency);
    assert!(state.flags.stalled);

    supervisor.observe(&mut state, &Action::RunAgent(AgentKind::Timeline));
    assert!(!state.flags.stalled);
    assert_eq!(state.flags.consecutive_waits, 0);
}

#[test]
fn test_action_helpers() {
    assert_eq!(
        Action::FanOut(vec![AgentKind::Timeline, AgentKind::KeyFacts]).agents().len(),
        2
    );
    assert!(Action::Terminate.agents().is_empty());
    assert_eq!(Action::WaitForDependency.to_string(), "wait_for_dependency");
}
