//! # tb
//!
//! Demo client for Tickbridge adapters.
//!
//! Runs a `Sleep` action against an in-process sleep server, ticking it the
//! way a tree executor would:
//! - `tb run <file.toml>` — tick each configured step until it finishes or
//!   its timeout halts it
//! - `tb ports` — list registered node types and their ports

mod commands;
mod run_file;
mod sleep;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Tickbridge demo client — tick remote actions from a synchronous loop.
#[derive(Parser)]
#[command(name = "tb", version, about)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tick the steps of a run file.
    Run {
        /// Run file (TOML).
        file: PathBuf,
        /// Tick interval in milliseconds (overrides the run file).
        #[arg(long)]
        tick_ms: Option<u64>,
        /// Append adapter events as JSONL to this file.
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// List registered node types and their ports.
    Ports {
        /// Print manifests as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tb_action=info".parse()?)
                .add_directive("tb=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    match &cli.command {
        Commands::Run {
            file,
            tick_ms,
            events,
        } => commands::run::execute(file, *tick_ms, events.as_deref()),
        Commands::Ports { json } => commands::ports::execute(*json),
    }
}
