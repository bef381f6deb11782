//! Docket - Adaptive Legal Case Analysis
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;

use config::LoggingSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let app_config = config::load_config()?;
    let _guard = init_logging(&app_config.logging)?;

    debug!("Starting Docket v{}", env!("CARGO_PKG_VERSION"));
    if cli.command.is_some() && !std::path::Path::new(".env").exists() {
        warn!(".env file not found; LLM credentials must come from the environment");
    }

    cli::run(cli, app_config).await
}

/// Console logs go to stderr so `--json` output stays clean. The returned
/// guard must live until exit to flush the file sink.
fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docket=info,docket_core=info".into());

    let (human, json) = if settings.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    let (file, guard) = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "docket.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(human)
        .with(json)
        .with(file)
        .init();

    Ok(guard)
}
