//! Command-line interface parsing using clap.
//!
//! Defines the CLI structure. Security validation of the policy path
//! happens afterward, in `validator`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "phoenix")]
#[command(about = concat!("Phoenix adaptive telemetry collector v", env!("CARGO_PKG_VERSION")))]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Policy document path. Falls back to `PHX_POLICY_FILE` if omitted.
    #[arg(short, long, global = true)]
    pub policy: Option<PathBuf>,

    /// Enable verbose (debug-level) logging, overriding `RUST_LOG`.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the pipeline, governor, and safety monitor and run until a
    /// shutdown signal is received.
    Run {
        /// Governor tick interval in seconds. Overrides the policy's
        /// `governance.tick_interval_seconds` when set.
        #[arg(long)]
        tick_interval_seconds: Option<u64>,
    },

    /// Validate a policy document and exit 0 on success, non-zero with
    /// diagnostics otherwise.
    Validate {
        /// Policy document to validate. Overrides `--policy`/`PHX_POLICY_FILE`.
        policy_file: Option<PathBuf>,
    },

    /// Print the current `ConfigStatus` of every processor as structured
    /// text.
    DumpStatus,

    /// Force safe-mode entry regardless of current resource readings.
    ForceSafeMode,

    /// Exit safe mode and restore the pre-safe-mode parameter snapshot.
    ExitSafeMode,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
