//! SiteWatch command line entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sitewatch::{AppState, RunSnapshot, StartOutcome, StatePaths, StepKind, SummaryBadge};

#[derive(Debug, Parser)]
#[command(name = "sitewatch", version, about = "Run website analyses one step at a time")]
struct Cli {
    /// Config file (defaults to ~/.sitewatch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (defaults to ~/.sitewatch/data.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the analysis steps against a target
    Run {
        target: String,
        /// Comma-separated subset of steps, e.g. performance,dns
        #[arg(long, value_delimiter = ',')]
        steps: Vec<StepKind>,
        /// Store this session token before running
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the persisted snapshot as JSON
    Show,
    /// Discard results and the persisted snapshot
    Clear,
    /// List registered steps in execution order
    Steps,
    /// Store a session token
    Login { token: String },
    /// Remove the session token; the next access wipes the persisted snapshot
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitewatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let defaults = StatePaths::default_paths().context("resolving state directory")?;
    let paths = StatePaths {
        config: cli.config.unwrap_or(defaults.config),
        database: cli.database.unwrap_or(defaults.database),
    };

    let state = AppState::new();
    state
        .initialize(paths)
        .await
        .context("initializing application state")?;

    let result = dispatch(&state, cli.command).await;
    state.shutdown().await.context("shutting down")?;
    result
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run { target, steps, token } => {
            if let Some(token) = token {
                state.set_auth_token(&token).await?;
            }
            let orchestrator = state.orchestrator().await?;

            let stopper = orchestrator.clone();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping after the current step");
                    stopper.stop_analysis();
                }
            });

            let selected = (!steps.is_empty()).then_some(steps.as_slice());
            let outcome = orchestrator.start_run(&target, selected).await;
            ctrl_c.abort();

            match outcome {
                StartOutcome::Completed(summary) => {
                    print_steps(&orchestrator.snapshot());
                    println!(
                        "\n{}: {} succeeded, {} failed, {} skipped in {} ms{}",
                        summary.target,
                        summary.success_count,
                        summary.failed_count,
                        summary.skipped_count,
                        summary.total_duration_ms,
                        if summary.cancelled { " (stopped)" } else { "" }
                    );
                }
                StartOutcome::Ignored(reason) => {
                    anyhow::bail!("run not started: {:?}", reason);
                }
                StartOutcome::Superseded => {
                    println!("run was superseded by a newer run");
                }
            }
        }
        Command::Show => {
            let snapshot = state.snapshot_store().await?.load();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Clear => {
            state.orchestrator().await?.clear_results();
            println!("results cleared");
        }
        Command::Steps => {
            let orchestrator = state.orchestrator().await?;
            let registry = orchestrator.registry();
            for kind in registry.steps_in_order() {
                let disabled = if registry.is_disabled(*kind) { "  (disabled)" } else { "" };
                println!(
                    "{:<12} {:<22} {}{}",
                    kind.as_str(),
                    kind.display_name(),
                    registry.endpoint(*kind),
                    disabled
                );
            }
        }
        Command::Login { token } => {
            state.set_auth_token(&token).await?;
            println!("session token stored");
        }
        Command::Logout => {
            state.clear_auth_token().await?;
            state.snapshot_store().await?.load();
            println!("session token removed");
        }
    }
    Ok(())
}

fn print_steps(snapshot: &RunSnapshot) {
    for (kind, status) in snapshot.steps.iter() {
        if !snapshot.selected_steps.contains(&kind) {
            continue;
        }
        let detail = match (&status.error, status.duration_ms) {
            (Some(error), _) => error.clone(),
            (None, Some(ms)) => format!("{} ms", ms),
            (None, None) => String::new(),
        };
        println!(
            "{} {:<22} {}",
            SummaryBadge::from(status.state),
            kind.display_name(),
            detail
        );
    }
}
