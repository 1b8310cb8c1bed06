//! Execute a batch of trades from a CSV file.

use crate::instructions::read_instructions;
use crate::results::{save_results, Summary};
use crate::runner::{BatchRunner, LiveExecutors};
use anyhow::Result;
use batch_trade_core::ConfigLoader;
use clap::Args;
use std::path::{Path, PathBuf};

/// Arguments for the execute command.
#[derive(Args, Debug, Clone)]
pub struct ExecuteArgs {
    /// CSV file with trade instructions.
    pub csv_file: PathBuf,

    /// Results file; relative names go in the configured results directory.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Validate and log trades without sending any orders.
    #[arg(long)]
    pub dry_run: bool,
}

/// Runs the execute command.
///
/// # Errors
/// Returns an error if the instructions cannot be read or the results
/// cannot be saved. Individual trade failures are reported, not returned.
pub async fn run_execute(config_path: &Path, args: ExecuteArgs) -> Result<()> {
    let mut config = ConfigLoader::load(config_path)?;
    if args.dry_run {
        config.trading.dry_run = true;
    }
    if config.trading.dry_run {
        tracing::info!("dry run enabled, no orders will be sent");
    }

    let instructions = read_instructions(&args.csv_file)?;

    let trading = config.trading.clone();
    let mut runner = BatchRunner::new(trading.clone(), LiveExecutors::new(config));
    let results = runner.run(&instructions).await;

    let path = save_results(&results, args.output.as_deref(), &trading.results_dir)?;
    println!("{}", Summary::new(&results));
    println!("\nDetailed results saved to: {}", path.display());
    Ok(())
}
