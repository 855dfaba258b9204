//! Tollgate CLI binary.
//!
//! This binary provides command-line access to Tollgate's configuration:
//! - Validate a configuration and show the effective limits
//! - Probe the candidates of a model

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, handle_check, handle_probe};

    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tollgate::init_telemetry(default_filter)?;

    // Execute the requested command
    let result = match cli.command {
        Commands::Check { config, format } => handle_check(config.as_deref(), format),
        Commands::Probe {
            config,
            model,
            tokens,
        } => handle_probe(config.as_deref(), &model, tokens).await,
    };

    tollgate::shutdown_telemetry();
    result
}
