//! LibreMap sync CLI
//!
//! Replicates router documents from configured CouchDB sources into a
//! unified LibreMap database.
//!
//! # Commands
//!
//! - `run` - Replicate the sources into the target, once or continuously
//! - `status` - Show each source's persisted checkpoint
//! - `check-config` - Parse and validate a configuration file

mod commands;
mod couch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LibreMap document synchronization.
#[derive(Parser)]
#[command(name = "lmsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(global = true, short, long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the checkpoint state file
    #[arg(global = true, short, long, default_value = "lmsync-state.json")]
    state: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate the configured sources into the target
    Run {
        /// Keep cycling with long-poll instead of stopping after one pass
        #[arg(long)]
        continuous: bool,
    },

    /// Show each source's persisted checkpoint
    Status,

    /// Parse and validate a configuration file
    CheckConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { continuous } => commands::run::run(&cli.config, &cli.state, continuous)?,
        Commands::Status => commands::status::run(&cli.config, &cli.state)?,
        Commands::CheckConfig => commands::check::run(&cli.config)?,
    }
    Ok(())
}
