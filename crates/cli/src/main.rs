//! # Broadcast CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - config and recipient loading with validation
//! - broadcast orchestration with progress reporting
//! - graceful cancellation on Ctrl+C

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_send, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (TELEGRAM_TOKEN usually lives there)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig::with_level(
        cli.log_format,
        cli.log_level(),
    ))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Broadcast CLI starting");

    let result = match &cli.command {
        Commands::Send(args) => run_send(args).await,
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
