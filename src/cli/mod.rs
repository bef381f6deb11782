//! CLI module for Docket
//!
//! Provides commands:
//! - `run`: analyse a case and print the report
//! - `agents`: show the agent dependency and priority table
//! - `tools`: show the tools an agent may call

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod agents;
pub mod run;
pub mod tools;

/// Docket legal analysis CLI
#[derive(Parser, Debug)]
#[command(name = "docket")]
#[command(about = "Adaptive multi-agent legal case analysis")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyse a case
    Run(RunArgs),
    /// Show the agent table
    Agents,
    /// Show the tools an agent may call
    Tools(ToolsArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Case identifier (a folder under the documents directory)
    #[arg(long)]
    pub case: String,
    /// Analyses to run, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub analyses: Vec<String>,
    /// Documents directory, overrides `retrieval.documents_dir`
    #[arg(long)]
    pub docs: Option<PathBuf>,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct ToolsArgs {
    /// Agent name
    #[arg(long)]
    pub agent: String,
    /// Highest sensitivity to include
    #[arg(long, default_value = "high")]
    pub max_sensitivity: String,
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Run(args)) => run::run(&config, args).await,
        Some(Commands::Agents) => agents::run(),
        Some(Commands::Tools(args)) => tools::run(&config, args),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
