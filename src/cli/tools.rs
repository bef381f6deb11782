//! `docket tools`

use super::ToolsArgs;
use crate::config::AppConfig;
use anyhow::{anyhow, Result};
use docket_core::{register_builtins, AgentKind, DirectoryRetriever};
use docket_tools::{Sensitivity, ToolRegistry};
use std::sync::Arc;

pub fn run(config: &AppConfig, args: ToolsArgs) -> Result<()> {
    let agent: AgentKind = args
        .agent
        .parse()
        .map_err(|e: docket_core::Error| anyhow!(docket_core::format_error_for_cli(&e)))?;
    let max: Sensitivity = args.max_sensitivity.parse()?;

    let mut registry = ToolRegistry::new();
    register_builtins(
        &mut registry,
        Arc::new(DirectoryRetriever::new(config.retrieval.documents_dir.clone())),
    );

    let tools = registry.get_tools_for_agent(agent.as_str(), max, &[]);
    if tools.is_empty() {
        println!("No tools available to {agent} at sensitivity <= {max}");
        return Ok(());
    }

    println!("Tools available to {agent} (sensitivity <= {max}):");
    for tool in tools {
        println!(
            "  {:<22} {:<8} ${:.4}/call  {}",
            tool.name, tool.sensitivity, tool.cost_estimate, tool.description
        );
    }
    Ok(())
}
