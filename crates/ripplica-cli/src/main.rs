//! Ripplica CLI
//!
//! Answer research questions from the web, with a semantic answer cache.

use anyhow::Result;
use clap::Parser;
use ripplica_core::error::exit_codes;
use ripplica_core::{Config, RipplicaError};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod progress;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<RipplicaError>()
            .map(RipplicaError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    config.validate()?;
    tracing::debug!("Cache database: {}", config.cache.database_path().display());

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Query(args) => commands::query::run(args, config, cli.format).await,
        Commands::Search(args) => commands::search::run(args, config, cli.format).await,
        Commands::Scrape(args) => commands::scrape::run(args, config, cli.format).await,
        Commands::Classify(args) => commands::classify::run(args, config, cli.format).await,
        Commands::Cache(args) => commands::cache::run(args, config, cli.format).await,
    }
}
