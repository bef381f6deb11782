//! `docket run`: analyse one case

use super::RunArgs;
use crate::config::AppConfig;
use anyhow::{anyhow, Result};
use docket_core::resilience;
use docket_core::{
    format_error_for_cli, register_builtins, AgentRegistry, DirectoryRetriever, Orchestrator,
    RunEvent, RunReport, RunStatus,
};
use docket_llm::YandexProvider;
use docket_tools::ToolRegistry;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(config: &AppConfig, args: RunArgs) -> Result<()> {
    let provider = YandexProvider::new(config.yandex_config())
        .map_err(|e| anyhow!(format_error_for_cli(&e.into())))?;

    let documents = args
        .docs
        .clone()
        .unwrap_or_else(|| config.retrieval.documents_dir.clone());
    let mut tools = ToolRegistry::new();
    register_builtins(&mut tools, Arc::new(DirectoryRetriever::new(documents)));

    let orchestrator = Orchestrator::new(
        AgentRegistry::llm_backed(Arc::new(provider), config.analysis_settings()),
        config.orchestrator_config()?,
    )
    .with_resilience(resilience::init_global(&config.resilience_config()?))
    .with_tools(Arc::new(tools));

    let mut handle = orchestrator
        .start_run(&args.case, &args.analyses)
        .map_err(|e| anyhow!(format_error_for_cli(&e)))?;
    info!(run_id = %handle.run_id(), case_id = %args.case, "Run started");

    let cancel = handle.cancel_token();
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => {
                    if !args.json {
                        print_event(&event);
                    }
                    if event.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted, cancelling run");
                interrupted = true;
                cancel.cancel();
            }
        }
    }

    let report = handle.wait().await?;
    let breakers = orchestrator.breaker_stats(None);
    let costs = orchestrator.cost_summary(Some(report.run_id)).await;

    if args.json {
        let output = serde_json::json!({
            "report": report,
            "circuit_breakers": breakers,
            "costs": costs,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report);
        println!("\nCircuit breakers:");
        for stats in &breakers {
            println!(
                "  {:<18} {:<9} error rate {:>5.1}%  ({} failed / {} ok)",
                stats.name,
                stats.state.to_string(),
                stats.error_rate * 100.0,
                stats.error_count,
                stats.success_count
            );
        }
        println!(
            "\nCost: ${:.4} over {} tokens ({} calls, {} failed)",
            costs.total_cost, costs.total_tokens, costs.successful_calls, costs.failed_calls
        );
        for (agent, cost) in &costs.by_agent {
            println!(
                "  {:<18} {:>7} tokens  llm ${:.4}  tools ${:.4}",
                agent, cost.total_tokens, cost.llm_cost, cost.tool_cost
            );
        }
    }

    if report.status == RunStatus::Failed {
        return Err(anyhow!("no requested analysis succeeded"));
    }
    Ok(())
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::PhaseStarted { phase, agents, .. } => {
            let names: Vec<&str> = agents.iter().map(|a| a.as_str()).collect();
            println!("▶ phase {phase}: {}", names.join(", "));
        }
        RunEvent::StepCompleted { agent, result, .. } => {
            println!(
                "  ✅ {agent} ({} tokens, {}ms, attempt {})",
                result.tokens, result.duration_ms, result.attempts
            );
        }
        RunEvent::StepFailed {
            agent, error, kind, ..
        } => println!("  ❌ {agent} [{kind}]: {error}"),
        RunEvent::Replanned {
            old_plan,
            new_plan,
            reason,
            ..
        } => println!(
            "🔄 plan v{} -> v{}: {reason}",
            old_plan.version, new_plan.version
        ),
        RunEvent::RunCompleted { .. } => {}
    }
}

fn print_report(report: &RunReport) {
    println!(
        "\nRun {} for case {}: {} in {:.1}s",
        report.run_id,
        report.case_id,
        report.status,
        report.duration_ms as f64 / 1000.0
    );

    for agent in &report.requested {
        match report.results.get(agent) {
            Some(output) => {
                println!("\n## {agent}\n{}", output.content.trim());
            }
            None => println!("\n## {agent}\n(no result)"),
        }
    }

    if !report.errors.is_empty() {
        println!("\nErrors:");
        for error in &report.errors {
            println!(
                "  {} {} attempt {} [{}]: {}",
                error.agent, error.step_id, error.attempt, error.kind, error.message
            );
        }
    }
}
