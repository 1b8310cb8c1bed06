//! List Schwab account identifiers and their hashes.

use anyhow::Result;
use batch_trade_core::ConfigLoader;
use batch_trade_schwab::SchwabExecutor;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Renders one row per account hash with every identifier that resolves to it.
#[must_use]
pub fn format_accounts(accounts: &BTreeMap<String, Vec<String>>) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();
    let _ = writeln!(out, "\nAVAILABLE SCHWAB ACCOUNTS");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:<36} | OTHER IDENTIFIERS (number / display name)", "ACCOUNT HASH");
    let _ = writeln!(out, "{}", "-".repeat(80));
    for (hash, aliases) in accounts {
        let _ = writeln!(out, "{hash:<36} | {}", aliases.join(", "));
    }
    out.push_str(&rule);
    out
}

/// Runs the list-schwab-accounts command.
///
/// # Errors
/// Returns an error only if the configuration cannot be loaded.
pub async fn run_list_accounts(config_path: &Path) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;

    let mut executor = match SchwabExecutor::connect(&config).await {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!(error = %e, "error initialising Schwab");
            println!("Unable to initialise Schwab - cannot list accounts.");
            return Ok(());
        }
    };

    let accounts = match executor.broker_mut().accounts_by_hash().await {
        Ok(accounts) => accounts,
        Err(e) => {
            tracing::error!(error = %e, "error listing Schwab accounts");
            BTreeMap::new()
        }
    };
    if accounts.is_empty() {
        println!("No Schwab accounts found (account map is empty).");
        return Ok(());
    }

    println!("{}", format_accounts(&accounts));
    Ok(())
}
