//! Planner - dependency-ordered initial plans
//!
//! The requested analyses are closed over their dependencies and ordered
//! topologically; among agents whose dependencies are already placed the
//! lower priority (then name) goes first.

use crate::agents::AgentKind;
use crate::error::{Error, Result};
use crate::state::{Plan, PlanStep, RunState, StepStatus};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};


/// `requested` plus every transitive dependency
#[must_use]
pub fn dependency_closure(requested: &BTreeSet<AgentKind>) -> BTreeSet<AgentKind> {
    let mut closure = BTreeSet::new();
    let mut stack: Vec<AgentKind> = requested.iter().copied().collect();
    while let Some(agent) = stack.pop() {
        if closure.insert(agent) {
            stack.extend(agent.dependencies().iter().copied());
        }
    }
    closure
}

/// Build the initial plan for `requested`
pub fn build_plan(requested: &BTreeSet<AgentKind>) -> Result<Plan> {
    if requested.is_empty() {
        return Err(Error::Configuration("no analyses requested".to_string()));
    }

    let agents = dependency_closure(requested);
    let mut indegree: BTreeMap<AgentKind, usize> = agents
        .iter()
        .map(|a| (*a, a.dependencies().len()))
        .collect();

    let mut ready: BinaryHeap<Reverse<(u8, &'static str, AgentKind)>> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(a, _)| Reverse((a.priority(), a.as_str(), *a)))
        .collect();

    let mut steps = Vec::with_capacity(agents.len());
    while let Some(Reverse((_, _, agent))) = ready.pop() {
        steps.push(PlanStep::new(agent.as_str(), agent));
        for dependent in agent.dependents() {
            if let Some(d) = indegree.get_mut(&dependent) {
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse((dependent.priority(), dependent.as_str(), dependent)));
                }
            }
        }
    }

    if steps.len() != agents.len() {
        let placed: BTreeSet<AgentKind> = steps.iter().map(|s| s.agent).collect();
        let stuck: Vec<&str> = agents
            .difference(&placed)
            .map(AgentKind::as_str)
            .collect();
        return Err(Error::Configuration(format!(
            "dependency cycle among: {}",
            stuck.join(", ")
        )));
    }

    let plan = Plan { version: 1, steps };
    validate_plan(&plan)?;
    Ok(plan)
}

/// Every step's dependencies appear in an earlier step
pub fn validate_plan(plan: &Plan) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for step in &plan.steps {
        if !ids.insert(step.step_id.as_str()) {
            return Err(Error::Configuration(format!(
                "duplicate step id {}",
                step.step_id
            )));
        }
        if let Some(missing) = step.dependencies.iter().find(|d| !seen.contains(*d)) {
            return Err(Error::Configuration(format!(
                "step {} depends on {} which is not planned before it",
                step.step_id, missing
            )));
        }
        seen.insert(step.agent);
    }
    Ok(())
}

/// Pending steps whose dependencies all have results, in scheduling order
#[must_use]
pub fn runnable_steps(state: &RunState) -> Vec<&PlanStep> {
    let mut runnable: Vec<&PlanStep> = state
        .plan
        .with_status(StepStatus::Pending)
        .filter(|s| !state.has_result(s.agent))
        .filter(|s| s.dependencies.iter().all(|d| state.has_result(*d)))
        .collect();
    runnable.sort_by_key(|s| s.agent.schedule_key());
    runnable.dedup_by_key(|s| s.agent);
    runnable
}
