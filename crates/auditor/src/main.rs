//! Auditor - local security auditing agent
//!
//! Spawns the configured MCP worker processes, aggregates their tools into
//! one catalogue and drives a Gemini-backed conversation loop over them.
//!
//! # Examples
//!
//! ```bash
//! # Interactive REPL
//! auditor
//!
//! # Execute a single prompt
//! auditor -e "Are there any suspicious open ports?"
//!
//! # Alternate roster and model
//! auditor -c ./workers.json -m gemini-2.5-pro
//! ```

mod args;
mod repl;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use auditor_agent::{GeminiClient, Session, SYSTEM_PROMPT};
use auditor_core::AgentEvent;
use auditor_mcp::{connect_workers, load_worker_config, WorkerConfig};

use crate::args::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Missing .env is fine; it only seeds API keys for local runs.
    let _ = dotenvy::dotenv();

    let log_level = if args.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("auditor={log_level}").parse()?)
                .add_directive(format!("auditor_mcp={log_level}").parse()?)
                .add_directive(format!("auditor_agent={log_level}").parse()?),
        )
        .try_init();

    let roster = load_roster(&args)?;
    if roster.is_empty() {
        tracing::warn!("worker roster is empty; running without tools");
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<AgentEvent>();
    let printer = tokio::spawn(print_events(event_rx, args.json));

    let registry = Arc::new(connect_workers(&roster, &event_tx).await);
    tracing::info!(
        "{} worker(s) connected, {} tool(s) available",
        registry.worker_count(),
        registry.tool_count()
    );

    let mut client = GeminiClient::from_env()?;
    if let Some(model) = &args.model {
        client = client.with_model(model);
    }

    let mut session = Session::new(SYSTEM_PROMPT, registry.clone(), Arc::new(client), event_tx);

    let outcome = match &args.execute {
        Some(prompt) => repl::execute_once(&mut session, prompt).await,
        None => repl::run_repl(&mut session).await,
    };

    registry.shutdown_all().await;
    printer.abort();
    outcome
}

/// Resolve and load the worker roster. An explicit `--config` path must
/// exist; the default path is allowed to be absent.
fn load_roster(args: &Args) -> anyhow::Result<BTreeMap<String, WorkerConfig>> {
    match &args.config {
        Some(path) => load_worker_config(path),
        None => {
            let path = default_roster_path()?;
            if path.exists() {
                load_worker_config(&path)
            } else {
                tracing::debug!("no roster at {}", path.display());
                Ok(BTreeMap::new())
            }
        }
    }
}

fn default_roster_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".auditor").join("workers.json"))
}

/// Render lifecycle events on stderr so stdout stays clean for answers.
async fn print_events(mut rx: mpsc::UnboundedReceiver<AgentEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("{line}");
            }
            continue;
        }
        match event {
            AgentEvent::WorkerConnected { worker, tool_count } => {
                eprintln!("[worker] {worker} connected ({tool_count} tools)");
            }
            AgentEvent::WorkerFailed { worker, error } => {
                eprintln!("[worker] {worker} failed: {error}");
            }
            AgentEvent::ToolCollision { tool, worker } => {
                eprintln!("[worker] {worker} redeclares '{tool}'; first registration kept");
            }
            AgentEvent::ToolInvoked { tool, .. } => {
                eprintln!("[tool] {tool} ...");
            }
            AgentEvent::ToolCompleted { tool, is_error, .. } => {
                let status = if is_error { "error" } else { "ok" };
                eprintln!("[tool] {tool} {status}");
            }
            // Turn-level events matter for scripting, not for the terminal.
            _ => {}
        }
    }
}
