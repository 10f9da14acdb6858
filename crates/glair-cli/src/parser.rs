//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line driver for the GLAIR live media core.
///
/// Handles global options and dispatches to subcommands.
#[derive(Parser)]
#[command(name = "glair")]
#[command(about = "Capture cropped screenshots and replay realtime media sessions")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON). Defaults apply when omitted or missing.
    #[arg(long = "config", env = "GLAIR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
