//! Sample instruction file.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Example batch covering both exchanges, a limit order, an extended-hours
/// order and dollar amounts.
pub const SAMPLE_TRADES: &str = "\
# exchange,ticker,action,order_type,quantity,price,session
hood,AAPL,buy,market,10,,normal
hood,MSFT,buy,market,$500,,normal
sch,GOOGL,buy,market,$1000,,normal
sch,TSLA,buy,limit,5,310.5,normal
hood,NVDA,sell,market,2,,ext
";

/// Arguments for the create-sample command.
#[derive(Args, Debug, Clone)]
pub struct CreateSampleArgs {
    /// Where to write the sample file.
    #[arg(long, default_value = "sample_trades.csv")]
    pub path: PathBuf,
}

/// Writes [`SAMPLE_TRADES`] to `path`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_sample(path: &Path) -> Result<()> {
    std::fs::write(path, SAMPLE_TRADES)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Runs the create-sample command.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn run_create_sample(args: CreateSampleArgs) -> Result<()> {
    write_sample(&args.path)?;
    println!(
        "Created {} with example data (includes dollar amount examples)",
        args.path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::read_instructions;
    use batch_trade_core::{Exchange, Quantity};

    #[test]
    fn test_sample_parses() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample_trades.csv");
        write_sample(&path).unwrap();

        let rows = read_instructions(&path).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].line, 2);
        assert!(rows.iter().any(|r| matches!(r.quantity, Quantity::Dollars(_))));
        assert_eq!(rows[3].exchange, Exchange::Schwab);
        assert!(rows[3].price.is_some());
    }
}
