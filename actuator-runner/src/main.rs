//! Actuator
//!
//! Runs one atomic administrative job on this node and reports the outcome.
//!
//! Architecture:
//! - Configuration: node path conventions and defaults from the environment
//! - Services: idempotent installer, config reconciler, process lifecycle
//! - Jobs: the `JobRunner` implementations and their registry
//! - Execution: drives one job through init, run and rollback
//!
//! The dispatcher invokes the binary once per job, reads the JSON report
//! from stdout and decides from it whether to retry. Logs go to stderr.

mod config;
mod context;
mod error;
mod execution;
mod jobs;
mod service;
mod shell;
#[cfg(test)]
mod test_support;

use actuator_coordinator::TdbctlCoordinator;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::context::JobContext;
use crate::execution::JobExecutor;
use crate::jobs::JobRegistry;
use crate::service::SupervisedProcess;
use crate::shell::ShellRunner;

#[derive(Parser)]
#[command(name = "actuator")]
#[command(about = "Idempotent atomic jobs for database node administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job and print its report as JSON
    Run {
        /// Registered job name
        #[arg(long)]
        job: String,

        /// Job parameters as a JSON string
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// File holding the job parameters
        #[arg(long)]
        payload_file: Option<PathBuf>,
    },
    /// List registered jobs
    List,
    /// Print an example payload for a job
    Example {
        #[arg(long)]
        job: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "actuator_runner=info,actuator_coordinator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config()?;
    let executor = build_executor(config);

    match cli.command {
        Commands::Run {
            job,
            payload,
            payload_file,
        } => {
            let payload = read_payload(payload, payload_file)?;
            let report = executor.execute(&job, &payload).await;

            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to encode job report")?
            );

            if report.result.exit_code != 0 {
                std::process::exit(report.result.exit_code);
            }
        }
        Commands::List => {
            for name in executor.registry().names() {
                println!("{}", name);
            }
        }
        Commands::Example { job } => {
            let runner = executor
                .instantiate(&job)
                .with_context(|| format!("Unknown job '{}'", job))?;
            println!("{}", serde_json::to_string_pretty(&runner.example())?);
        }
    }

    Ok(())
}

/// Loads configuration from environment variables; unset ones keep their defaults
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    config.validate()?;
    Ok(config)
}

fn build_executor(config: Config) -> JobExecutor {
    let service = SupervisedProcess::new(config.layout.clone(), config.stop_timeout);
    let context = JobContext::new(
        config,
        Arc::new(ShellRunner),
        Arc::new(service),
        Arc::new(TdbctlCoordinator),
    );

    info!(
        "Actuator ready: run_id={}, agent={}",
        context.run_id, context.config.layout.agent_name
    );

    JobExecutor::new(JobRegistry::with_defaults(), context)
}

fn read_payload(inline: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (inline, file) {
        (Some(payload), _) => Ok(payload),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read payload file {}", path.display())),
        (None, None) => anyhow::bail!("either --payload or --payload-file is required"),
    }
}
