mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

const DEFAULT_LOG_FILTER: &str = "client=info,preparer=info,harvester=info,common=info";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // RUST_LOG tiene prioridad sobre el filtro por defecto
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::PrepareJobs(args) => commands::prepare_jobs(args).await?,
        Commands::Harvest(args) => commands::harvest(args).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
