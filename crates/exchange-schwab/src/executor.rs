//! Schwab trade executor.
//!
//! Turns one batch instruction into a quote, a risk check, an order and,
//! for limit orders, a bounded wait for the fill.

use crate::auth::{AuthConfig, AuthOrchestrator, TokenProvider};
use crate::broker::SchwabBroker;
use crate::client::{SchwabClientConfig, SchwabHttpClient};
use crate::error::Result;
use crate::oauth::{SchwabOAuth, SchwabOAuthConfig};
use crate::orders::OrderSpec;
use crate::transport::SchwabTransport;
use async_trait::async_trait;
use batch_trade_core::{
    AppConfig, Exchange, FillPolicy, OrderKind, RiskLimits, SchwabConfig, TradeExecutor,
    TradeInstruction, TradeResult,
};
use rust_decimal::Decimal;

/// Executes instructions against Schwab.
pub struct SchwabExecutor<T, P> {
    broker: SchwabBroker<T, P>,
    config: SchwabConfig,
    risk: RiskLimits,
    fill_policy: FillPolicy,
    default_account: Option<String>,
}

impl<T, P> std::fmt::Debug for SchwabExecutor<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabExecutor")
            .field("broker", &self.broker)
            .field("risk", &self.risk)
            .field("fill_policy", &self.fill_policy)
            .field("default_account", &self.default_account)
            .finish_non_exhaustive()
    }
}

impl SchwabExecutor<SchwabHttpClient, SchwabOAuth> {
    /// Signs in to Schwab and loads the account listing.
    ///
    /// # Errors
    /// Returns configuration, authentication or listing errors.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let transport = SchwabHttpClient::new(
            SchwabClientConfig::default().with_base_url(config.schwab.api_base_url.clone()),
        )?;
        let provider = SchwabOAuth::new(SchwabOAuthConfig::from(&config.schwab))?;
        let auth = AuthOrchestrator::new(AuthConfig::from(&config.schwab), provider);
        let broker = SchwabBroker::connect(auth, transport).await?;
        Self::with_broker(broker, config).await
    }
}

impl<T: SchwabTransport, P: TokenProvider> SchwabExecutor<T, P> {
    /// Wraps an authenticated broker and picks the default account.
    ///
    /// # Errors
    /// Returns the listing error if the account map cannot be populated.
    pub async fn with_broker(mut broker: SchwabBroker<T, P>, config: &AppConfig) -> Result<Self> {
        let identifiers = broker.list_identifiers().await?;
        tracing::info!(accounts = ?identifiers, "Schwab initialised");

        let schwab = &config.schwab;
        let default_account = if !schwab.account_hash.is_empty() {
            Some(schwab.account_hash.clone())
        } else if !schwab.account_name.is_empty() {
            broker.resolve(&schwab.account_name)
        } else {
            identifiers.first().and_then(|id| broker.resolve(id))
        };
        tracing::info!(default_account = ?default_account, "default Schwab account hash");

        Ok(Self {
            broker,
            config: schwab.clone(),
            risk: RiskLimits::from_max_order_value(config.trading.max_order_value),
            fill_policy: FillPolicy::from_timeout_secs(config.trading.limit_order_timeout),
            default_account,
        })
    }

    #[must_use]
    pub fn with_fill_policy(mut self, policy: FillPolicy) -> Self {
        self.fill_policy = policy;
        self
    }

    #[must_use]
    pub fn broker(&self) -> &SchwabBroker<T, P> {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut SchwabBroker<T, P> {
        &mut self.broker
    }

    /// Hash chosen at connect time from the configuration or the listing.
    #[must_use]
    pub fn default_account(&self) -> Option<&str> {
        self.default_account.as_deref()
    }

    async fn run(&mut self, instruction: &TradeInstruction, shares: u32) -> TradeResult {
        let result = TradeResult::pending(instruction, Some(shares));
        let ticker = instruction.ticker.as_str();

        let Some(account) = self.config.account_for_ticker(ticker).map(str::to_string) else {
            return result.failed("No Schwab account identifier configured for this trade");
        };

        let current_price = match self.broker.last_price(ticker).await {
            Ok(price) => price,
            Err(e) => return result.failed(format!("Failed to get quote for {ticker}: {e}")),
        };

        let limit_price = match instruction.order_kind {
            OrderKind::Last => Some(current_price),
            OrderKind::Limit => instruction.price,
            OrderKind::Market => None,
        };
        let result = match limit_price {
            Some(price) => result.with_price(price),
            None => result,
        };

        let check_price = limit_price.unwrap_or(current_price);
        if let Err(violation) = self.risk.check_order_value(check_price, shares) {
            return result.failed(violation.to_string());
        }

        let hash = match self.broker.lookup_hash(&account).await {
            Ok(Some(hash)) => hash,
            Ok(None) => return result.failed(format!("Could not resolve hash for account {account:?}")),
            Err(e) => return result.failed(format!("Could not resolve hash for account {account:?}: {e}")),
        };

        let order = match OrderSpec::equity(
            instruction.action,
            instruction.order_kind,
            ticker,
            shares,
            limit_price,
            instruction.is_extended(),
        ) {
            Ok(order) => order,
            Err(e) => return result.failed(e.to_string()),
        };

        let order_id = match self.broker.place_order(&order, &hash).await {
            Ok(Some(id)) => id,
            Ok(None) => return result.failed("Order failed - no order-id returned"),
            Err(e) => return result.failed(format!("Order failed: {e}")),
        };
        tracing::info!(
            order_type = %instruction.order_kind,
            action = %instruction.action,
            shares,
            %ticker,
            %order_id,
            "Schwab order placed"
        );
        let result = result.with_order_id(order_id.clone());

        if instruction.order_kind != OrderKind::Limit {
            return result.succeeded("Market order submitted");
        }

        let outcome = self.broker.wait_for_fill(&hash, &order_id, self.fill_policy).await;
        if outcome.is_filled() {
            result.succeeded(format!("Limit order filled ({})", outcome.label()))
        } else {
            result.failed(format!("Limit order not filled ({})", outcome.label()))
        }
    }
}

#[async_trait]
impl<T: SchwabTransport, P: TokenProvider> TradeExecutor for SchwabExecutor<T, P> {
    fn exchange(&self) -> Exchange {
        Exchange::Schwab
    }

    async fn latest_price(&mut self, ticker: &str) -> anyhow::Result<Decimal> {
        Ok(self.broker.last_price(ticker).await?)
    }

    async fn execute(&mut self, instruction: &TradeInstruction, shares: u32) -> TradeResult {
        self.run(instruction, shares).await
    }
}
