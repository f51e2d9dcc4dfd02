use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use farehound::airports::MetroIndex;
use farehound::commands;
use farehound::config::Config;
use farehound::db;

#[derive(Parser)]
#[command(name = "farehound", version, about = "Weekend flight-deal discovery engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the polling scheduler daemon
    Run,
    /// Prune stale flights, orphaned deals and old scan-log entries once
    Prune,
    /// Send the daily digest for all active profiles now
    Digest,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Both of these are fatal at startup: without a database or the airport
    // table there is nothing sensible to do.
    let pool = db::establish_pool(&config.database_url)?;
    db::run_migrations(&pool)?;
    let index = Arc::new(
        MetroIndex::load(&config.airports_csv).context("failed to load airport table")?,
    );

    match cli.command {
        Command::Run => commands::handle_run(config, pool, index).await,
        Command::Prune => commands::handle_prune(config, pool, index).await,
        Command::Digest => commands::handle_digest(config, pool, index).await,
    }
}
