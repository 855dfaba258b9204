//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the tollgate binary.

mod check;
mod commands;
mod probe;

pub use check::handle_check;
pub use commands::{Cli, Commands, OutputFormat};
pub use probe::handle_probe;

use std::path::Path;

use tollgate::{GatewayConfig, TollgateResult};

/// Load an explicit configuration file, or the layered default configuration.
fn load_config(path: Option<&Path>) -> TollgateResult<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::from_file(path),
        None => GatewayConfig::load(),
    }
}
