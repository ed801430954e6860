//! CLI argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// Local security auditor agent.
#[derive(Parser, Debug, Clone)]
#[command(name = "auditor")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Execute a single prompt and exit
    #[arg(short = 'e', long)]
    pub execute: Option<String>,

    /// Worker roster file (default: ~/.auditor/workers.json)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Override the decision model
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Output lifecycle events as JSON lines on stderr
    #[arg(long)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
