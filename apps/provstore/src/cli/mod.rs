//! # provstore CLI Module
//!
//! ## Available Commands
//!
//! - `counter` - Read, increment or set one counter
//! - `resolve` - Print the directory and file of an identifier
//! - `diff` - Print the update text between two N-Quads files
//! - `replay` - Resend spooled upload batches
//! - `pending` - List spooled upload batches
//! - `history` - List the recorded snapshots of one entity

mod commands;

use clap::{Args, Parser, Subcommand};
use provstore_core::ProvstoreError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// provstore - provenance-aware incremental persistence
///
/// Inspect counters, resolve storage paths, diff graphs and replay uploads.
#[derive(Parser, Debug)]
#[command(name = "provstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read, increment or set a counter of the configured backend
    Counter {
        #[command(subcommand)]
        action: CounterAction,
    },

    /// Resolve an entity, snapshot or dataset IRI to its storage path
    Resolve {
        /// Full identifier under the configured base IRI
        #[arg(short, long)]
        iri: String,
    },

    /// Print the update text turning one N-Quads file into another
    Diff {
        /// Previous state
        #[arg(short, long)]
        previous: PathBuf,

        /// Current state
        #[arg(short = 'n', long)]
        current: PathBuf,

        /// Named graph to compare (also the default for N-Triples lines)
        #[arg(short, long)]
        graph: String,
    },

    /// Resend every spooled batch to the configured endpoint
    Replay,

    /// List spooled batches
    Pending,

    /// List the snapshots of an entity kept in the configured registry
    History {
        /// Full entity identifier under the configured base IRI
        #[arg(short, long)]
        iri: String,
    },
}

/// Counter operations.
#[derive(Subcommand, Debug)]
pub enum CounterAction {
    /// Print the current value
    Read(CounterArgs),

    /// Add one and print the new value
    Increment(CounterArgs),

    /// Overwrite the value
    Set {
        #[command(flatten)]
        target: CounterArgs,

        /// New value
        #[arg(long)]
        value: u64,

        /// Allow lowering the counter
        #[arg(long)]
        force: bool,
    },
}

/// Which counter to address.
#[derive(Args, Debug, Clone)]
pub struct CounterArgs {
    /// Two-letter entity type tag (br, ra, id, ...)
    #[arg(short = 't', long = "type")]
    pub entity_type: String,

    /// Supplier prefix
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Address the snapshot counter of this entity number instead
    #[arg(short, long)]
    pub snapshot_of: Option<u64>,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), ProvstoreError> {
    let config = load_config(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Counter { action } => cmd_counter(&config, &action, json_mode),
        Commands::Resolve { iri } => cmd_resolve(&config, &iri, json_mode),
        Commands::Diff {
            previous,
            current,
            graph,
        } => cmd_diff(&previous, &current, &graph, json_mode),
        Commands::Replay => cmd_replay(&config, json_mode),
        Commands::Pending => cmd_pending(&config, json_mode),
        Commands::History { iri } => cmd_history(&config, &iri, json_mode),
    }
}
