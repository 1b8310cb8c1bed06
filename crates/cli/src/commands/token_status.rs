//! Report the health of the stored Schwab credentials without signing in.

use anyhow::Result;
use batch_trade_core::ConfigLoader;
use batch_trade_schwab::{CredentialStore, TokenStatus};
use chrono::Utc;
use std::fmt::Write;
use std::path::Path;

/// Renders the status report.
#[must_use]
pub fn format_token_status(status: &TokenStatus) -> String {
    let rule = "=".repeat(50);
    let mut out = String::new();
    let _ = writeln!(out, "\nSCHWAB TOKEN STATUS");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Status: {}", status.health.as_str().to_uppercase());
    if let Some(message) = &status.message {
        let _ = writeln!(out, "Details: {message}");
    }
    if let Some(created) = status.created {
        let _ = writeln!(out, "Created: {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(age) = status.age_days {
        let _ = writeln!(out, "Age: {age:.1} days");
    }
    if let Some(days) = status.days_until_expiry {
        let _ = writeln!(out, "Days until refresh token expires: {days:.1}");
    }
    if status.created.is_some() {
        let _ = writeln!(
            out,
            "Needs refresh: {}",
            if status.needs_refresh { "YES" } else { "NO" }
        );
    }
    let _ = writeln!(out, "\nRecommendation: {}", status.recommendation);
    out.push_str(&rule);
    out
}

/// Runs the check-schwab-tokens command.
///
/// # Errors
/// Returns an error only if the configuration cannot be loaded.
pub fn run_token_status(config_path: &Path) -> Result<()> {
    let config = ConfigLoader::load(config_path)?;
    let store = CredentialStore::new(config.schwab.token_path.clone());
    let status = TokenStatus::evaluate(&store.read(), Utc::now(), config.schwab.refresh_threshold_days);
    tracing::debug!(health = %status.health, path = %store.path().display(), "token status evaluated");
    println!("{}", format_token_status(&status));
    Ok(())
}
