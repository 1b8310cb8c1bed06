use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod instructions;
mod results;
mod runner;

use commands::{CreateSampleArgs, ExecuteArgs};

#[derive(Parser)]
#[command(name = "batch-trade")]
#[command(about = "Batch equity order placement on Robinhood and Schwab", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Optional log file path (appends logs to the file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the trades listed in a CSV file
    Execute(ExecuteArgs),
    /// Write a sample trade CSV file
    CreateSample(CreateSampleArgs),
    /// List Schwab account identifiers and their hashes
    ListSchwabAccounts,
    /// Check Schwab token status and expiration
    CheckSchwabTokens,
}

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    match cli.command {
        Commands::Execute(args) => {
            if let Err(e) = commands::run_execute(&cli.config, args).await {
                tracing::error!(error = %e, "error in main execution");
                return Err(e);
            }
        }
        Commands::CreateSample(args) => {
            commands::run_create_sample(args)?;
        }
        Commands::ListSchwabAccounts => {
            commands::run_list_accounts(&cli.config).await?;
        }
        Commands::CheckSchwabTokens => {
            commands::run_token_status(&cli.config)?;
        }
    }

    Ok(())
}
