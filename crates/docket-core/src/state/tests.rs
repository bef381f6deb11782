use super::*;

fn failure(attempt: u32, kind: ErrorKind) -> AttemptFailure {
    AttemptFailure {
        attempt,
        kind,
        message: format!("attempt {attempt} failed"),
    }
}

fn state_for(agents: &[AgentKind]) -> RunState {
    let plan = Plan {
        version: 1,
        steps: agents
            .iter()
            .map(|a| PlanStep::new(a.as_str(), *a))
            .collect(),
    };
    RunState::new(
        Uuid::new_v4(),
        "case-1",
        agents.iter().copied().collect(),
        plan,
    )
}

#[test]
fn test_plan_step_dependencies_from_table() {
    let step = PlanStep::new("risk", AgentKind::Risk);
    assert_eq!(step.dependencies, vec![AgentKind::Discrepancy]);
    assert_eq!(step.status, StepStatus::Pending);

    let skipped = step.skipped("dependency discrepancy unavailable");
    assert_eq!(skipped.status, StepStatus::Skipped);
    assert!(skipped.reason.unwrap().contains("discrepancy"));
}

#[test]
fn test_success_stores_result_once() {
    let mut state = state_for(&[AgentKind::Timeline]);

    let first = StepUpdate::success(AgentKind::Timeline, "timeline", AgentOutput::text("first"));
    assert_eq!(state.apply_update(first), Applied::Stored);

    let second = StepUpdate::success(AgentKind::Timeline, "timeline", AgentOutput::text("second"));
    assert_eq!(state.apply_update(second), Applied::Duplicate);

    assert_eq!(state.results[&AgentKind::Timeline].content, "first");
    assert!(state.completed_steps.contains("timeline"));
    assert_eq!(
        state.plan.step("timeline").unwrap().status,
        StepStatus::Completed
    );
    assert!(state.is_complete());
}

#[test]
fn test_success_after_retry_keeps_attempt_errors() {
    let mut state = state_for(&[AgentKind::KeyFacts]);
    let mut update = StepUpdate::success(AgentKind::KeyFacts, "key_facts", AgentOutput::text("ok"));
    update.failures.push(failure(1, ErrorKind::Transient));

    assert_eq!(state.apply_update(update.clone()), Applied::Stored);
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].agent, AgentKind::KeyFacts);
    assert_eq!(state.errors[0].kind, ErrorKind::Transient);
    // recovered attempts do not push toward a replan
    assert_eq!(state.flags.errors_since_replan, 0);

    assert_eq!(state.apply_update(update), Applied::Duplicate);
    assert_eq!(state.errors.len(), 1);
}

#[test]
fn test_failure_appends_each_attempt() {
    let mut state = state_for(&[AgentKind::Discrepancy]);
    let update = StepUpdate::failure(
        AgentKind::Discrepancy,
        "discrepancy",
        vec![
            failure(1, ErrorKind::Transient),
            failure(2, ErrorKind::Transient),
            failure(3, ErrorKind::Timeout),
        ],
    );

    assert_eq!(state.apply_update(update.clone()), Applied::Failed(3));
    assert_eq!(state.errors_for(AgentKind::Discrepancy).count(), 3);
    assert_eq!(state.flags.errors_since_replan, 3);
    assert_eq!(
        state.plan.step("discrepancy").unwrap().status,
        StepStatus::Failed
    );

    // The same update again adds nothing
    assert_eq!(state.apply_update(update), Applied::Failed(0));
    assert_eq!(state.errors.len(), 3);
    assert_eq!(state.flags.errors_since_replan, 3);
}

#[test]
fn test_late_failure_after_success_is_ignored() {
    let mut state = state_for(&[AgentKind::Summary]);
    state.apply_update(StepUpdate::success(
        AgentKind::Summary,
        "summary",
        AgentOutput::text("done"),
    ));

    let late = StepUpdate::failure(
        AgentKind::Summary,
        "summary",
        vec![failure(1, ErrorKind::Timeout)],
    );
    assert_eq!(state.apply_update(late), Applied::Failed(0));
    assert!(state.errors.is_empty());
    assert_eq!(
        state.plan.step("summary").unwrap().status,
        StepStatus::Completed
    );
}

#[test]
fn test_error_log_bounded_per_agent() {
    let mut state = state_for(&[AgentKind::Risk, AgentKind::Timeline]);
    state.apply_update(StepUpdate::failure(
        AgentKind::Timeline,
        "timeline",
        vec![failure(1, ErrorKind::Transient)],
    ));

    let failures: Vec<AttemptFailure> = (1..=14).map(|n| failure(n, ErrorKind::Transient)).collect();
    state.apply_update(StepUpdate::failure(AgentKind::Risk, "risk", failures));

    let risk: Vec<u32> = state.errors_for(AgentKind::Risk).map(|e| e.attempt).collect();
    assert_eq!(risk.len(), MAX_ERRORS_PER_AGENT);
    assert_eq!(risk.first(), Some(&5));
    assert_eq!(risk.last(), Some(&14));
    assert_eq!(state.errors_for(AgentKind::Timeline).count(), 1);
}

#[test]
fn test_dependencies_met() {
    let mut state = state_for(&[AgentKind::Discrepancy, AgentKind::Risk]);
    assert!(state.dependencies_met(AgentKind::Discrepancy));
    assert!(!state.dependencies_met(AgentKind::Risk));

    state.apply_update(StepUpdate::success(
        AgentKind::Discrepancy,
        "discrepancy",
        AgentOutput::text("none"),
    ));
    assert!(state.dependencies_met(AgentKind::Risk));
}

#[test]
fn test_plan_queries() {
    let mut state = state_for(&[AgentKind::Timeline, AgentKind::KeyFacts]);
    assert!(state.plan.is_scheduled(AgentKind::Timeline));
    assert_eq!(
        state.plan.pending_step(AgentKind::KeyFacts).unwrap().step_id,
        "key_facts"
    );

    state.mark_in_progress("timeline");
    assert_eq!(state.plan.with_status(StepStatus::InProgress).count(), 1);
    assert!(state.plan.is_scheduled(AgentKind::Timeline));
    assert!(state.plan.pending_step(AgentKind::Timeline).is_none());
    assert_eq!(state.plan.attempts_for(AgentKind::Timeline), 1);
}

#[test]
fn test_succeeded_lists_requested_only() {
    let mut state = state_for(&[AgentKind::Risk]);
    state.results.insert(AgentKind::Discrepancy, AgentOutput::text("d"));
    assert!(state.succeeded().is_empty());
    state.results.insert(AgentKind::Risk, AgentOutput::text("r"));
    assert_eq!(state.succeeded(), vec![AgentKind::Risk]);
}

#[test]
fn test_step_status_serde() {
    assert_eq!(
        serde_json::to_string(&StepStatus::InProgress).unwrap(),
        "\"in_progress\""
    );
    assert!(StepStatus::Skipped.is_terminal());
    assert!(!StepStatus::Pending.is_terminal());
}
