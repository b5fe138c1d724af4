use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use queuectl_core::SqliteStore;
use tracing::debug;

mod cli;
mod commands;
mod config;

use cli::{Cli, Command, DlqCommand, WorkerCommand};
use config::Config;

fn setup_logging(verbose: bool) -> Result<()> {
    // stdout is reserved for command output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize logging: {e}"))?;

    debug!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config_path = cli.config_path();

    match cli.command {
        Command::Config { command } => commands::config(&config_path, command),
        Command::Worker {
            command: WorkerCommand::Stop,
        } => commands::worker_stop(&cli.db),
        Command::Enqueue { job_json } => {
            let (config, store) = open(&cli.db, &config_path).await?;
            commands::enqueue(&store, &config, &job_json).await
        }
        Command::Worker {
            command: WorkerCommand::Start { count },
        } => {
            let (config, store) = open(&cli.db, &config_path).await?;
            commands::worker_start(store, &config, count, &cli.db).await
        }
        Command::Status => {
            let (_, store) = open(&cli.db, &config_path).await?;
            commands::status(&store, &cli.db).await
        }
        Command::List { state } => {
            let (_, store) = open(&cli.db, &config_path).await?;
            commands::list(&store, state).await
        }
        Command::Dlq { command } => {
            let (_, store) = open(&cli.db, &config_path).await?;
            match command {
                DlqCommand::List => commands::dlq_list(&store).await,
                DlqCommand::Retry { job_id } => commands::dlq_retry(&store, &job_id).await,
            }
        }
    }
}

async fn open(db: &Path, config_path: &Path) -> Result<(Config, Arc<SqliteStore>)> {
    let config = Config::load(config_path)?;
    let store = SqliteStore::open(db)
        .await
        .context(format!("Failed to open database {}", db.display()))?;
    Ok((config, Arc::new(store)))
}
