//! Magpie CLI — memory engine commands and the stdio tool server.
//!
//! One-shot commands (ingest, retrieve, forget, prune, status, init-schema)
//! connect, run, and exit. `serve` and `metabolism` stay up until stdin
//! closes or the process is interrupted.

mod cli;
mod cmd;
mod tools;
mod ui;

use crate::cli::{Cli, Commands};
use clap::Parser;

/// Logs go to stderr; stdout is reserved for command output and, under
/// `serve`, protocol frames.
fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let result = match cli.command {
        Commands::Serve => cmd::system::cmd_serve(cli.config, cli.profile),
        Commands::Metabolism => cmd::system::cmd_metabolism(cli.config, cli.profile),
        Commands::InitSchema => cmd::system::cmd_init_schema(cli.config, cli.profile),
        Commands::Status { json } => cmd::system::cmd_status(cli.config, cli.profile, json),
        Commands::Ingest {
            text,
            role,
            entities,
        } => cmd::memory::cmd_ingest(cli.config, cli.profile, &text, &role, entities),
        Commands::Retrieve {
            query,
            top_k,
            fast,
            json,
        } => cmd::memory::cmd_retrieve(cli.config, cli.profile, &query, top_k, fast, json),
        Commands::Forget { id } => cmd::memory::cmd_forget(cli.config, cli.profile, &id),
        Commands::Prune { threshold } => {
            cmd::memory::cmd_prune(cli.config, cli.profile, threshold)
        }
    };

    if let Err(e) = result {
        ui::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
