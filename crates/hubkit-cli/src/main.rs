//! hubkit CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hubkit_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result};
use hubkit_core::LoggingConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default(),
    };

    // Initialize logging
    setup_logging(cli.verbose, &config.hub.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from: {}", path),
        None => info!("Using default configuration"),
    }

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging from the verbosity flag and the logging config
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: bool, logging: &LoggingConfig) {
    if !logging.enabled && !verbose {
        return;
    }

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
