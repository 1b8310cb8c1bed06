use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub robinhood: RobinhoodConfig,
    pub schwab: SchwabConfig,
    pub trading: TradingConfig,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobinhoodConfig {
    pub username: String,
    pub password: String,
    pub mfa_code: Option<String>,
    pub base_url: String,
}

impl std::fmt::Debug for RobinhoodConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobinhoodConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Default for RobinhoodConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            mfa_code: None,
            base_url: "https://api.robinhood.com".to_string(),
        }
    }
}

impl RobinhoodConfig {
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchwabConfig {
    pub app_key: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub token_path: PathBuf,
    pub account_hash: String,
    pub account_name: String,
    /// Ticker to account identifier (number, display name, or hash).
    pub account_by_ticker: BTreeMap<String, String>,
    pub enable_proactive_refresh: bool,
    pub refresh_threshold_days: u32,
    pub api_base_url: String,
}

impl std::fmt::Debug for SchwabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabConfig")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_path", &self.token_path)
            .field("account_hash", &self.account_hash)
            .field("account_name", &self.account_name)
            .field("enable_proactive_refresh", &self.enable_proactive_refresh)
            .field("refresh_threshold_days", &self.refresh_threshold_days)
            .finish_non_exhaustive()
    }
}

impl Default for SchwabConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            app_secret: String::new(),
            redirect_uri: "https://127.0.0.1:8182".to_string(),
            token_path: PathBuf::from("./schwab_tokens.json"),
            account_hash: String::new(),
            account_name: String::new(),
            account_by_ticker: BTreeMap::new(),
            enable_proactive_refresh: true,
            refresh_threshold_days: 5,
            api_base_url: "https://api.schwabapi.com".to_string(),
        }
    }
}

impl SchwabConfig {
    /// Account identifier to trade `ticker` in.
    ///
    /// Looks in `account_by_ticker` first, then `account_hash`, then
    /// `account_name`. Empty strings count as unset.
    #[must_use]
    pub fn account_for_ticker(&self, ticker: &str) -> Option<&str> {
        self.account_by_ticker
            .get(ticker)
            .map(String::as_str)
            .into_iter()
            .chain([self.account_hash.as_str(), self.account_name.as_str()])
            .find(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub dry_run: bool,
    pub max_order_value: f64,
    pub default_time_in_force: String,
    pub results_dir: PathBuf,
    /// Seconds to wait for a limit order to fill; capped at 60 when used.
    pub limit_order_timeout: u64,
    pub csv_log_file: PathBuf,
    /// Pause between sequential trades.
    pub trade_delay_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            max_order_value: crate::risk::DEFAULT_MAX_ORDER_VALUE,
            default_time_in_force: "DAY".to_string(),
            results_dir: PathBuf::from("trade_results"),
            limit_order_timeout: 30,
            csv_log_file: PathBuf::from("order_log.csv"),
            trade_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.trading.dry_run);
        assert_eq!(config.trading.limit_order_timeout, 30);
        assert_eq!(config.schwab.refresh_threshold_days, 5);
        assert!(config.schwab.enable_proactive_refresh);
        assert_eq!(config.schwab.redirect_uri, "https://127.0.0.1:8182");
        assert!(config.robinhood.mfa_code.is_none());
    }

    #[test]
    fn test_account_for_ticker_precedence() {
        let mut schwab = SchwabConfig::default();
        assert_eq!(schwab.account_for_ticker("AAPL"), None);

        schwab.account_name = "Rollover IRA".to_string();
        assert_eq!(schwab.account_for_ticker("AAPL"), Some("Rollover IRA"));

        schwab.account_hash = "abc-1".to_string();
        assert_eq!(schwab.account_for_ticker("AAPL"), Some("abc-1"));

        schwab
            .account_by_ticker
            .insert("AAPL".to_string(), "12345678".to_string());
        assert_eq!(schwab.account_for_ticker("AAPL"), Some("12345678"));
        assert_eq!(schwab.account_for_ticker("MSFT"), Some("abc-1"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut schwab = SchwabConfig::default();
        schwab.app_secret = "super-secret".to_string();
        assert!(!format!("{schwab:?}").contains("super-secret"));

        let mut hood = RobinhoodConfig::default();
        hood.password = "hunter2".to_string();
        assert!(!format!("{hood:?}").contains("hunter2"));
    }

    #[test]
    fn test_partial_json_keeps_section_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"trading": {"dry_run": false}}"#).unwrap();
        assert!(!config.trading.dry_run);
        assert_eq!(config.trading.csv_log_file, PathBuf::from("order_log.csv"));
        assert_eq!(config.schwab.refresh_threshold_days, 5);
    }
}
