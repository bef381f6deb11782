use super::*;
use crate::agents::AgentOutput;
use crate::planner::build_plan;
use crate::state::StepUpdate;
use crate::utils::{AttemptFailure, CircuitBreakerConfig};
use uuid::Uuid;

fn failure(attempt: u32, kind: ErrorKind) -> AttemptFailure {
    AttemptFailure {
        attempt,
        kind,
        message: "upstream unavailable".to_string(),
    }
}

fn state_for(requested: &[AgentKind]) -> RunState {
    let requested: BTreeSet<AgentKind> = requested.iter().copied().collect();
    let plan = build_plan(&requested).unwrap();
    RunState::new(Uuid::new_v4(), "case-1", requested, plan)
}

fn succeed(state: &mut RunState, agent: AgentKind) {
    state.apply_update(StepUpdate::success(agent, agent.as_str(), AgentOutput::text("ok")));
}

fn fail(state: &mut RunState, agent: AgentKind, step_id: &str, kind: ErrorKind, attempts: u32) {
    let failures = (1..=attempts).map(|n| failure(n, kind)).collect();
    state.apply_update(StepUpdate::failure(agent, step_id, failures));
}

fn breakers() -> CircuitBreakerRegistry {
    CircuitBreakerRegistry::new(CircuitBreakerConfig::default())
}

/// Scenario B shape: discrepancy keeps failing, breaker opens
#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_agent_and_dependents() {
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Risk]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);
    fail(&mut state, AgentKind::Discrepancy, "discrepancy", ErrorKind::Transient, 3);

    let registry = breakers();
    let breaker = registry.get("discrepancy");
    for _ in 0..3 {
        breaker.record_failure();
    }
    assert!(registry.is_open("discrepancy"));

    let replanner = Replanner::default();
    let trigger = replanner.trigger(&state).unwrap();
    assert!(trigger.reason.contains("3 errors"));

    let record = replanner
        .replan(&mut state, trigger, &registry, Instant::now())
        .unwrap()
        .clone();

    assert_eq!(record.old_plan.version, 1);
    assert_eq!(record.new_plan.version, 2);
    let discrepancy = state.plan.step("discrepancy").unwrap();
    assert_eq!(discrepancy.status, StepStatus::Skipped);
    assert_eq!(discrepancy.reason.as_deref(), Some("circuit open"));
    let risk = state.plan.step("risk").unwrap();
    assert_eq!(risk.status, StepStatus::Skipped);
    assert_eq!(risk.reason.as_deref(), Some("dependency discrepancy unavailable"));

    assert_eq!(state.replan_attempts, 1);
    assert_eq!(state.flags.errors_since_replan, 0);
    assert_eq!(state.adaptation_history.len(), 1);
}

/// Scenario E: completed steps survive the replan
#[tokio::test(start_paused = true)]
async fn test_replan_preserves_completed_steps() {
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Discrepancy]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);
    fail(&mut state, AgentKind::Discrepancy, "discrepancy", ErrorKind::Timeout, 3);

    let replanner = Replanner::default();
    let trigger = replanner.trigger(&state).unwrap();
    replanner
        .replan(&mut state, trigger, &breakers(), Instant::now())
        .unwrap();

    for id in ["timeline", "key_facts"] {
        assert_eq!(state.plan.step(id).unwrap().status, StepStatus::Completed);
    }
    // One failed step is not chronic: a substitute follows the failed one
    let ids: Vec<&str> = state.plan.steps.iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ids, vec!["key_facts", "timeline", "discrepancy", "discrepancy#2"]);
    assert_eq!(
        state.plan.step("discrepancy#2").unwrap().status,
        StepStatus::Pending
    );
    assert_eq!(state.plan.step("discrepancy").unwrap().status, StepStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_step_failures_become_chronic() {
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Discrepancy]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);
    fail(&mut state, AgentKind::Discrepancy, "discrepancy", ErrorKind::Transient, 1);

    let replanner = Replanner::new(ReplanPolicy::default().with_cooldown(Duration::from_secs(1)));
    let registry = breakers();
    replanner
        .replan(&mut state, ReplanTrigger::new("manual", 1), &registry, Instant::now())
        .unwrap();
    assert!(state.plan.is_scheduled(AgentKind::Discrepancy));

    state.mark_in_progress("discrepancy#2");
    fail(&mut state, AgentKind::Discrepancy, "discrepancy#2", ErrorKind::Transient, 1);
    tokio::time::advance(Duration::from_secs(2)).await;

    replanner
        .replan(&mut state, ReplanTrigger::new("manual", 1), &registry, Instant::now())
        .unwrap();
    let statuses: Vec<StepStatus> = state
        .plan
        .steps
        .iter()
        .filter(|s| s.agent == AgentKind::Discrepancy)
        .map(|s| s.status)
        .collect();
    assert_eq!(statuses, vec![StepStatus::Skipped, StepStatus::Skipped]);
    assert!(!state.plan.is_scheduled(AgentKind::Discrepancy));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_chronic() {
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Summary]);
    succeed(&mut state, AgentKind::Timeline);
    fail(&mut state, AgentKind::KeyFacts, "key_facts", ErrorKind::Fatal, 1);
    succeed(&mut state, AgentKind::Classification);

    let record = Replanner::default()
        .replan(&mut state, ReplanTrigger::new("manual", 1), &breakers(), Instant::now())
        .unwrap()
        .clone();
    assert_eq!(
        state.plan.step("summary").unwrap().reason.as_deref(),
        Some("dependency key_facts unavailable")
    );
    assert!(record
        .new_plan
        .step("key_facts")
        .unwrap()
        .reason
        .as_deref()
        .unwrap()
        .starts_with("fatal error"));
}

#[tokio::test(start_paused = true)]
async fn test_guards() {
    let replanner = Replanner::new(
        ReplanPolicy::default()
            .with_max_attempts(2)
            .with_cooldown(Duration::from_secs(60)),
    );
    let registry = breakers();
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Risk]);

    // Fewer than two completed steps
    succeed(&mut state, AgentKind::Timeline);
    assert_eq!(
        replanner.availability(&state, Instant::now()),
        ReplanAvailability::TooEarly
    );
    assert!(replanner
        .replan(&mut state, ReplanTrigger::new("early", 1), &registry, Instant::now())
        .is_none());

    succeed(&mut state, AgentKind::KeyFacts);
    assert!(replanner
        .replan(&mut state, ReplanTrigger::new("first", 1), &registry, Instant::now())
        .is_some());

    // Cooldown
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(
        replanner.availability(&state, Instant::now()),
        ReplanAvailability::CoolingDown
    );
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(replanner
        .replan(&mut state, ReplanTrigger::new("second", 1), &registry, Instant::now())
        .is_some());

    // Budget
    tokio::time::advance(Duration::from_secs(120)).await;
    assert_eq!(
        replanner.availability(&state, Instant::now()),
        ReplanAvailability::Exhausted
    );
    assert!(replanner
        .replan(&mut state, ReplanTrigger::new("third", 1), &registry, Instant::now())
        .is_none());
    assert_eq!(state.replan_attempts, 2);
    assert_eq!(state.adaptation_history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_replans_never_closer_than_cooldown() {
    let cooldown = Duration::from_secs(10);
    let replanner = Replanner::new(ReplanPolicy::default().with_cooldown(cooldown));
    let registry = breakers();
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);

    let mut replanned_at = Vec::new();
    for _ in 0..40 {
        let now = Instant::now();
        if replanner
            .replan(&mut state, ReplanTrigger::new("poll", 1), &registry, now)
            .is_some()
        {
            replanned_at.push(now);
        }
        tokio::time::advance(Duration::from_secs(3)).await;
    }

    assert_eq!(replanned_at.len(), 3);
    for pair in replanned_at.windows(2) {
        assert!(pair[1] - pair[0] >= cooldown);
    }
}

#[test]
fn test_trigger_sources() {
    let mut state = state_for(&[AgentKind::Timeline]);
    let replanner = Replanner::default();
    assert!(replanner.trigger(&state).is_none());

    state.flags.stalled = true;
    assert_eq!(replanner.trigger(&state).unwrap().reason, "no progress");

    state.pending_trigger = Some(
        ReplanTrigger::new("operator request", 5).with_action(ReplanAction::SkipFailed),
    );
    let trigger = replanner.trigger(&state).unwrap();
    assert_eq!(trigger.action, ReplanAction::SkipFailed);
    assert_eq!(trigger.priority, 5);
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_action_substitutes() {
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts, AgentKind::Risk]);
    succeed(&mut state, AgentKind::Timeline);
    succeed(&mut state, AgentKind::KeyFacts);
    fail(&mut state, AgentKind::Discrepancy, "discrepancy", ErrorKind::Fatal, 1);

    let trigger = ReplanTrigger::new("retry", 3).with_action(ReplanAction::RetryFailed);
    Replanner::default()
        .replan(&mut state, trigger, &breakers(), Instant::now())
        .unwrap();

    assert!(state.plan.pending_step(AgentKind::Discrepancy).is_some());
    assert_eq!(state.plan.step("risk").unwrap().status, StepStatus::Pending);
}
