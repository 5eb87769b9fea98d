//! lodekv CLI
//!
//! Command-line tools for lodekv data directories.
//!
//! # Commands
//!
//! - `inspect` - Display log, manifest and checkpoint metadata
//! - `verify` - Check every segment frame and record
//! - `dump-log` - Print change records for debugging
//! - `checkpoint` - Open the engine and write a checkpoint

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// lodekv command-line tools.
#[derive(Parser)]
#[command(name = "lodekv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display log, manifest and checkpoint metadata
    Inspect {
        /// Show per-segment details
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check frame checksums, sequence order and record encoding
    Verify,

    /// Print change records for debugging
    DumpLog {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print records with a sequence number above this one
        #[arg(short, long, default_value = "0")]
        after: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Open the engine, replay the log and write a checkpoint
    Checkpoint {
        /// Node id recorded in the checkpoint metadata
        #[arg(short, long, default_value = "lodekv-cli")]
        node_id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { segments, format } => {
            let path = cli.path.ok_or("Data directory path required for inspect")?;
            commands::inspect::run(&path, segments, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Data directory path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::DumpLog {
            limit,
            after,
            format,
        } => {
            let path = cli.path.ok_or("Data directory path required for dump-log")?;
            commands::dump_log::run(&path, limit, after, &format)?;
        }
        Commands::Checkpoint { node_id } => {
            let path = cli.path.ok_or("Data directory path required for checkpoint")?;
            commands::checkpoint::run(&path, &node_id)?;
        }
        Commands::Version => {
            println!("lodekv CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("lodekv core v{}", lodekv_core::VERSION);
        }
    }

    Ok(())
}
