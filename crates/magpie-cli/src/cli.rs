//! Clap CLI definitions for Magpie.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  magpie serve                        Tool server on stdio + background metabolism
  magpie ingest \"Ada joined Acme.\"    Store a memory fragment
  magpie retrieve \"who joined Acme?\"  Fusion recall across three strategies
  magpie status                       Heartbeat and queue depths
  magpie prune --threshold 1.0        One-shot decay maintenance

\x1b[1;36mQuick Start:\x1b[0m
  1. magpie init-schema               Create vector indexes + constraints
  2. magpie serve                     Attach to your agent host over stdio
  3. magpie status                    Watch the metabolism work

\x1b[1;36mEnvironment:\x1b[0m
  MAGPIE_GRAPH_URI / MAGPIE_GRAPH_USER / MAGPIE_GRAPH_PASSWORD
  MAGPIE_MODEL_HOST / MAGPIE_EMBED_MODEL / MAGPIE_GENERATE_MODEL";

/// Magpie, a long-term memory engine for conversational agents.
#[derive(Parser)]
#[command(
    name = "magpie",
    version,
    about = "Magpie \u{2014} long-term memory for conversational agents",
    long_about = "Magpie \u{2014} long-term memory for conversational agents\n\n\
                  Stores conversation fragments in a graph, links the entities they\n\
                  mention, and metabolizes them in the background: embedding,\n\
                  contradiction checking, and hierarchical summarization.",
    after_help = AFTER_HELP,
    arg_required_else_help = true,
)]
pub struct Cli {
    /// Path to config file (default: ~/.magpie/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Graph profile to operate on (default: from config).
    #[arg(long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stdio tool server plus the background metabolism loop.
    Serve,
    /// Run only the background metabolism loop (no tool server).
    Metabolism,
    /// Create vector indexes and constraints in the graph store.
    InitSchema,
    /// Show metabolism heartbeat and queue depths.
    Status {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Store one memory fragment.
    Ingest {
        /// Fragment text.
        text: String,
        /// Speaker role: user, assistant, or system.
        #[arg(long, default_value = "user")]
        role: String,
        /// Entity to link explicitly (repeatable; skips extraction).
        #[arg(long = "entity")]
        entities: Vec<String>,
    },
    /// Recall memories with fusion retrieval.
    Retrieve {
        /// Natural-language query.
        query: String,
        /// Number of episodic fragments to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Relational strategy only; skips embedding calls entirely.
        #[arg(long)]
        fast: bool,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Delete one fragment and any entities orphaned by it.
    Forget {
        /// Fragment ID (UUID).
        id: String,
    },
    /// Decay maintenance: drop weak edges and orphaned entities.
    Prune {
        /// Weight cutoff (inclusive). Defaults to the configured threshold.
        #[arg(long)]
        threshold: Option<f64>,
    },
}
