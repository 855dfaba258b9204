//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tollgate - admission control and upstream election for LLM gateways
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "Admission control and upstream election for LLM gateways", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and print the effective limits
    Check {
        /// Configuration file (default: bundled, home and ./tollgate.toml layered)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Show how long a request would wait on every candidate of a model
    Probe {
        /// Configuration file (default: bundled, home and ./tollgate.toml layered)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Model name
        #[arg(long)]
        model: String,

        /// Estimated tokens of the request
        #[arg(long, default_value = "1")]
        tokens: u64,
    },
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
