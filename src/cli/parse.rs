//! CLI parse: clap types for Quarry. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quarry CLI - resumable batch generation of structured records
#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Resilient, resumable batch generation of structured records from LLM providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (default: ./quarry.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate records until the target count is reached
    Run {
        /// Number of records to generate
        #[arg(long)]
        target: Option<u64>,
        /// Records between checkpoints
        #[arg(long)]
        checkpoint_interval: Option<u64>,
        /// CPU ceiling in percent
        #[arg(long)]
        max_cpu: Option<f64>,
        /// Memory ceiling in MB
        #[arg(long)]
        max_memory: Option<f64>,
        /// Resume the given session from its checkpoint
        #[arg(long, conflicts_with = "session_id")]
        resume: Option<String>,
        /// Explicit id for a new session
        #[arg(long)]
        session_id: Option<String>,
        /// Skip exporting records on completion
        #[arg(long)]
        no_export: bool,
        /// Disable host resource sampling
        #[arg(long)]
        no_governor: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List sessions recorded in the ledger and resumable checkpoints
    Sessions {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Checkpoint commands (show, verify, remove)
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Validate the merged configuration
    Validate,
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Show progress stored in a checkpoint
    Show {
        session_id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Verify a checkpoint's digest and record sequence
    Verify { session_id: String },
    /// Delete a checkpoint
    Remove {
        session_id: String,
        /// Also drop the session and its events from the ledger
        #[arg(long)]
        forget: bool,
    },
}
