//! Goal-driven remote browser operator.
//!
//! `operator run "<goal>"` opens a remote browser session, lets the planning
//! service pick one step at a time and executes each step until the goal is
//! reached. Progress is printed as steps are planned; a transcript of every run
//! lands in `.operator/runs/`.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use operator::exit_codes;
use operator::io::config::{DEFAULT_CONFIG_PATH, OperatorConfig, load_config, write_config};
use operator::io::context_store::{clear_context, load_context};
use operator::logging;
use operator::session_loop::{Clients, Orchestrator, RunOutcome, StartOutcome};

#[derive(Parser)]
#[command(
    name = "operator",
    version,
    about = "Drive a remote browser session toward a natural-language goal"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a goal until it finishes, fails or is cancelled (Ctrl-C).
    Run {
        goal: String,
        /// Ignore the stored provider context for this run.
        #[arg(long)]
        fresh: bool,
        /// Print the final outcome as JSON instead of progress lines.
        #[arg(long)]
        json: bool,
    },
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Show or clear the stored provider context id.
    Context {
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    transcript: String,
    #[serde(flatten)]
    outcome: &'a RunOutcome,
}

#[tokio::main]
async fn main() {
    logging::init();
    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { goal, fresh, json } => cmd_run(&cli.config, &goal, fresh, json).await,
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Context { clear } => cmd_context(&cli.config, clear),
    }
}

async fn cmd_run(config_path: &Path, goal: &str, fresh: bool, json: bool) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let reuse = if fresh {
        None
    } else {
        load_context(&cfg.state.context_path)?.map(|state| state.context_id)
    };
    let clients = Clients::http(&cfg)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Some(code) = handle_interrupts(tokio::signal::ctrl_c, cancel).await {
                eprintln!("aborted");
                std::process::exit(code);
            }
        }
    });

    let mut orchestrator = Orchestrator::new(clients)
        .with_context_id(reuse)
        .with_cancellation(cancel);
    if !json {
        orchestrator = orchestrator.on_step(|step| {
            println!(
                "[{}] {:<8} {}",
                step.step_number, step.tool, step.display_text
            );
        });
    }

    let outcome = match orchestrator.start(goal).await.context("start run")? {
        StartOutcome::Completed(outcome) => outcome,
        StartOutcome::Ignored { phase } => bail!("run already in phase {phase:?}"),
    };

    if let Err(err) = outcome.persist_context(&cfg.state.context_path) {
        warn!(error = %format!("{err:#}"), "failed to persist context id");
    }
    let paths = outcome.write_transcript(&cfg.state.runs_dir)?;

    if json {
        let report = RunReport {
            transcript: paths.dir.display().to_string(),
            outcome: &outcome,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if let Some(session) = &outcome.session {
            println!("viewer: {}", session.session_url);
        }
        println!("{:?}: {}", outcome.display, outcome.status);
        println!("transcript: {}", paths.dir.display());
    }

    Ok(exit_codes::for_run(outcome.phase, outcome.failure.as_ref()))
}

/// The first interrupt cancels the run cooperatively. A second one returns the
/// exit code to abort with, without waiting for the in-flight call.
async fn handle_interrupts<F, Fut>(mut interrupt: F, cancel: CancellationToken) -> Option<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    interrupt().await.ok()?;
    eprintln!("cancelling after the current call completes (Ctrl-C again to abort)...");
    cancel.cancel();
    interrupt().await.ok()?;
    Some(exit_codes::CANCELLED)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &OperatorConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_context(config_path: &Path, clear: bool) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let path = &cfg.state.context_path;
    if clear {
        if clear_context(path)? {
            println!("cleared {}", path.display());
        } else {
            println!("no stored context");
        }
        return Ok(exit_codes::OK);
    }
    match load_context(path)? {
        Some(state) => println!("{} (updated {})", state.context_id, state.updated_at),
        None => println!("no stored context"),
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_flags() {
        let cli = Cli::parse_from(["operator", "run", "check weather", "--fresh", "--json"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        let Command::Run { goal, fresh, json } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(goal, "check weather");
        assert!(fresh && json);
    }

    #[test]
    fn parse_global_config_after_subcommand() {
        let cli = Cli::parse_from(["operator", "context", "--clear", "--config", "alt.toml"]);
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Command::Context { clear: true }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["operator", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[tokio::test]
    async fn second_interrupt_aborts_with_cancelled_code() {
        let cancel = CancellationToken::new();
        let code = handle_interrupts(|| std::future::ready(Ok(())), cancel.clone()).await;
        assert!(cancel.is_cancelled());
        assert_eq!(code, Some(exit_codes::CANCELLED));
    }

    #[tokio::test]
    async fn single_interrupt_only_cancels() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let interrupt = move || {
            calls += 1;
            std::future::ready(if calls == 1 {
                Ok(())
            } else {
                Err(std::io::Error::other("signal stream closed"))
            })
        };
        assert_eq!(handle_interrupts(interrupt, cancel.clone()).await, None);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        cmd_init(&path, false).expect("first init");
        assert!(cmd_init(&path, false).is_err());
        assert_eq!(cmd_init(&path, true).expect("force"), exit_codes::OK);
    }
}
