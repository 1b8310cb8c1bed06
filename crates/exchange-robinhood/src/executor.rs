//! Robinhood trade executor.

use crate::client::{RobinhoodClient, RobinhoodClientConfig};
use crate::error::{Result, RobinhoodError};
use crate::types::{OrderRequest, Side, TimeInForce};
use async_trait::async_trait;
use batch_trade_core::{
    wait_for_fill, AppConfig, Exchange, FillPolicy, OrderKind, RiskLimits, TradeExecutor,
    TradeInstruction, TradeResult,
};
use rust_decimal::Decimal;
use secrecy::SecretString;

/// Executes instructions against a logged-in Robinhood session.
#[derive(Debug)]
pub struct RobinhoodExecutor {
    client: RobinhoodClient,
    account_number: Option<String>,
    risk: RiskLimits,
    fill_policy: FillPolicy,
    time_in_force: String,
}

impl RobinhoodExecutor {
    /// Logs in and looks up the account number.
    ///
    /// A login without an account is kept; its trades fail individually.
    ///
    /// # Errors
    /// Returns error if credentials are missing or login fails.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let creds = &config.robinhood;
        if !creds.has_credentials() {
            return Err(RobinhoodError::Configuration(
                "Robinhood credentials not configured".to_string(),
            ));
        }

        let mut client =
            RobinhoodClient::new(RobinhoodClientConfig::default().with_base_url(creds.base_url.clone()))?;
        client
            .login(
                &creds.username,
                &SecretString::from(creds.password.clone()),
                creds.mfa_code.as_deref(),
            )
            .await?;

        let account_number = client.account_number().await?;
        match &account_number {
            Some(number) => tracing::info!(account = %number, "retrieved Robinhood account number"),
            None => tracing::warn!("could not retrieve Robinhood account number"),
        }

        Ok(Self::with_client(client, account_number, config))
    }

    /// Wraps an already logged-in client.
    #[must_use]
    pub fn with_client(client: RobinhoodClient, account_number: Option<String>, config: &AppConfig) -> Self {
        Self {
            client,
            account_number,
            risk: RiskLimits::from_max_order_value(config.trading.max_order_value),
            fill_policy: FillPolicy::from_timeout_secs(config.trading.limit_order_timeout),
            time_in_force: config.trading.default_time_in_force.clone(),
        }
    }

    #[must_use]
    pub fn with_fill_policy(mut self, policy: FillPolicy) -> Self {
        self.fill_policy = policy;
        self
    }

    #[must_use]
    pub fn account_number(&self) -> Option<&str> {
        self.account_number.as_deref()
    }

    async fn run(&mut self, instruction: &TradeInstruction, shares: u32) -> TradeResult {
        let result = TradeResult::pending(instruction, Some(shares));
        let ticker = instruction.ticker.as_str();

        let Some(account) = self.account_number.clone() else {
            return result.failed("No account number available");
        };

        let (limit_price, check_price) = match (instruction.order_kind, instruction.price) {
            (OrderKind::Limit, Some(price)) => (Some(price), price),
            (kind, price) => match self.client.latest_price(ticker).await {
                Ok(last) if kind == OrderKind::Last => (Some(last), last),
                Ok(last) => (price, last),
                Err(e) => {
                    tracing::error!(%ticker, error = %e, "Robinhood trade error");
                    return result.failed(format!("Error executing trade: {e}"));
                }
            },
        };
        let result = match limit_price {
            Some(price) => result.with_price(price),
            None => result,
        };

        if let Err(violation) = self.risk.check_order_value(check_price, shares) {
            return result.failed(violation.to_string());
        }

        let side = Side::from(instruction.action);
        let request = match instruction.order_kind {
            OrderKind::Market => OrderRequest::market(ticker, side, shares),
            OrderKind::Limit | OrderKind::Last => match limit_price {
                Some(price) => OrderRequest::limit(ticker, side, shares, price),
                None => return result.failed("Price required for limit/last order"),
            },
        }
        .with_time_in_force(TimeInForce::resolve(&self.time_in_force, instruction.order_kind))
        .with_extended_hours(instruction.is_extended());

        let info = match self.client.place_order(&account, &request).await {
            Ok(info) if !info.id.is_empty() => info,
            Ok(_) => return result.failed("Order failed: no order id returned"),
            Err(e) => return result.failed(format!("Order failed: {e}")),
        };
        tracing::info!(
            order_type = %instruction.order_kind,
            action = %instruction.action,
            shares,
            %ticker,
            order_id = %info.id,
            "Robinhood order placed"
        );
        let result = result.with_order_id(info.id.clone());

        if instruction.order_kind != OrderKind::Limit {
            let state = if info.state.is_empty() { "unknown" } else { info.state.as_str() };
            return result.succeeded(format!("Market order placed successfully. State: {state}"));
        }

        let outcome = wait_for_fill(&mut self.client, &info.id, self.fill_policy).await;
        if outcome.is_filled() {
            result.succeeded(format!("Limit order filled ({})", outcome.label()))
        } else {
            result.failed(format!("Limit order not filled ({})", outcome.label()))
        }
    }
}

#[async_trait]
impl TradeExecutor for RobinhoodExecutor {
    fn exchange(&self) -> Exchange {
        Exchange::Robinhood
    }

    async fn latest_price(&mut self, ticker: &str) -> anyhow::Result<Decimal> {
        Ok(self.client.latest_price(ticker).await?)
    }

    async fn execute(&mut self, instruction: &TradeInstruction, shares: u32) -> TradeResult {
        self.run(instruction, shares).await
    }
}
