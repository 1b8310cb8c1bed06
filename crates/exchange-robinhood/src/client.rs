//! Robinhood REST client with rate limiting.
//!
//! Signs in with the password grant and holds the bearer token in memory
//! for the life of the process.
//!
//! # Example
//!
//! ```ignore
//! use batch_trade_robinhood::{RobinhoodClient, RobinhoodClientConfig};
//!
//! let mut client = RobinhoodClient::new(RobinhoodClientConfig::default())?;
//! client.login("user", &password, None).await?;
//! let price = client.latest_price("AAPL").await?;
//! ```

use crate::error::{Result, RobinhoodError};
use crate::types::{OrderBody, OrderInfo, OrderRequest, OrderType};
use async_trait::async_trait;
use batch_trade_core::{OrderState, OrderTracker};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// Robinhood API base URL.
pub const ROBINHOOD_API_URL: &str = "https://api.robinhood.com";

/// Public OAuth client id used by the Robinhood web app.
const CLIENT_ID: &str = "c82SH0WZOsabOXGP2sxqcj34FxkvfnWRZBKlBjFS";

/// Session lifetime requested at login.
const SESSION_EXPIRES_IN_SECS: u32 = 86_400;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Robinhood client.
#[derive(Debug, Clone)]
pub struct RobinhoodClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RobinhoodClientConfig {
    fn default() -> Self {
        Self {
            base_url: ROBINHOOD_API_URL.to_string(),
            requests_per_minute: nonzero!(60u32),
            timeout_secs: 30,
        }
    }
}

impl RobinhoodClientConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    account_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    url: String,
}

// =============================================================================
// RobinhoodClient
// =============================================================================

/// HTTP client for the Robinhood equities API.
pub struct RobinhoodClient {
    config: RobinhoodClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
    access_token: Option<SecretString>,
}

impl std::fmt::Debug for RobinhoodClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobinhoodClient")
            .field("base_url", &self.config.base_url)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl RobinhoodClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: RobinhoodClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RobinhoodError::Network(format!("failed to build HTTP client: {e}")))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            config.requests_per_minute,
        )));

        Ok(Self {
            config,
            http,
            rate_limiter,
            access_token: None,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Validates an identifier used in a URL path.
    fn validate_identifier(id: &str) -> Result<&str> {
        if id.is_empty() {
            return Err(RobinhoodError::InvalidOrder(
                "identifier cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RobinhoodError::InvalidOrder(format!(
                "identifier must contain only alphanumeric, hyphen, or underscore: {id}"
            )));
        }

        Ok(id)
    }

    // ==================== Session ====================

    /// Signs in with username and password.
    ///
    /// # Errors
    /// Returns [`RobinhoodError::Authentication`] if no access token is issued.
    pub async fn login(
        &mut self,
        username: &str,
        password: &SecretString,
        mfa_code: Option<&str>,
    ) -> Result<()> {
        let device_token = uuid::Uuid::new_v4().to_string();
        let expires_in = SESSION_EXPIRES_IN_SECS.to_string();
        let mut form = vec![
            ("client_id", CLIENT_ID),
            ("expires_in", expires_in.as_str()),
            ("grant_type", "password"),
            ("password", password.expose_secret()),
            ("scope", "internal"),
            ("username", username),
            ("device_token", device_token.as_str()),
        ];
        if let Some(code) = mfa_code.filter(|c| !c.is_empty()) {
            form.push(("mfa_code", code));
        }

        self.rate_limiter.until_ready().await;
        let response = self
            .http
            .post(self.url("/oauth2/token/"))
            .form(&form)
            .send()
            .await?;
        let body: LoginResponse = Self::handle_response(response).await?.json().await?;

        let token = body.access_token.ok_or_else(|| {
            RobinhoodError::Authentication(
                body.detail
                    .unwrap_or_else(|| "login returned no access token".to_string()),
            )
        })?;
        self.access_token = Some(SecretString::from(token));
        tracing::info!(%username, "logged into Robinhood");
        Ok(())
    }

    // ==================== Request Helpers ====================

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .access_token
            .as_ref()
            .ok_or_else(|| RobinhoodError::Authentication("not logged in".to_string()))?;
        Ok(request
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json"))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let request = self.authorized(self.http.get(self.url(path)).query(query))?;
        self.rate_limiter.until_ready().await;
        let response = request.send().await?;
        Ok(Self::handle_response(response).await?.json().await?)
    }

    async fn post(&self, path: &str, body: &impl serde::Serialize) -> Result<Value> {
        let request = self.authorized(self.http.post(self.url(path)).json(body))?;
        self.rate_limiter.until_ready().await;
        let response = request.send().await?;
        let response = Self::handle_response(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn handle_response(response: Response) -> Result<Response> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(RobinhoodError::rate_limit(retry_after));
        }

        if status.as_u16() == 401 {
            let text = response.text().await.unwrap_or_default();
            return Err(RobinhoodError::Authentication(text));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RobinhoodError::api(status.as_u16(), text));
        }

        Ok(response)
    }

    // ==================== Account ====================

    /// Number of the first brokerage account on the login, if any.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn account_number(&self) -> Result<Option<String>> {
        let page: Page<AccountEntry> = serde_json::from_value(self.get("/accounts/", &[]).await?)?;
        Ok(page
            .results
            .into_iter()
            .next()
            .and_then(|a| a.account_number)
            .filter(|n| !n.is_empty()))
    }

    // ==================== Market Data ====================

    /// Most recent trade price, preferring the extended-hours print.
    ///
    /// # Errors
    /// Returns [`RobinhoodError::UnknownSymbol`] if no price is quoted.
    pub async fn latest_price(&self, symbol: &str) -> Result<Decimal> {
        let page: Page<Option<Value>> =
            serde_json::from_value(self.get("/quotes/", &[("symbols", symbol)]).await?)?;
        let quote = page
            .results
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| RobinhoodError::UnknownSymbol(symbol.to_string()))?;

        ["last_extended_hours_trade_price", "last_trade_price"]
            .iter()
            .filter_map(|field| quote.get(*field).and_then(Value::as_str))
            .find_map(|raw| Decimal::from_str(raw).ok())
            .ok_or_else(|| RobinhoodError::UnknownSymbol(symbol.to_string()))
    }

    /// Instrument URL for `symbol`, required when placing orders.
    ///
    /// # Errors
    /// Returns [`RobinhoodError::UnknownSymbol`] if no instrument matches.
    pub async fn instrument_url(&self, symbol: &str) -> Result<String> {
        let page: Page<InstrumentEntry> =
            serde_json::from_value(self.get("/instruments/", &[("symbol", symbol)]).await?)?;
        page.results
            .into_iter()
            .next()
            .map(|i| i.url)
            .ok_or_else(|| RobinhoodError::UnknownSymbol(symbol.to_string()))
    }

    // ==================== Orders ====================

    /// Places an order for `account_number`.
    ///
    /// Market orders are sent with the last trade price as their collar.
    ///
    /// # Errors
    /// Returns error if the order is malformed or rejected.
    pub async fn place_order(&self, account_number: &str, request: &OrderRequest) -> Result<OrderInfo> {
        Self::validate_identifier(account_number)?;
        if request.quantity == 0 {
            return Err(RobinhoodError::InvalidOrder("quantity must be positive".to_string()));
        }

        let price = match (request.order_type, request.price) {
            (OrderType::Limit, Some(price)) if price > Decimal::ZERO => price,
            (OrderType::Limit, _) => {
                return Err(RobinhoodError::InvalidOrder(
                    "limit orders need a positive price".to_string(),
                ))
            }
            (OrderType::Market, Some(price)) => price,
            (OrderType::Market, None) => self.latest_price(&request.symbol).await?,
        };

        let instrument = self.instrument_url(&request.symbol).await?;
        let account = self.url(&format!("/accounts/{account_number}/"));
        let body = OrderBody {
            account: &account,
            instrument: &instrument,
            symbol: &request.symbol,
            price: format_price(price),
            quantity: request.quantity,
            ref_id: uuid::Uuid::new_v4().to_string(),
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            trigger: "immediate",
            side: request.side,
            extended_hours: request.extended_hours,
            market_hours: if request.extended_hours {
                "extended_hours"
            } else {
                "regular_hours"
            },
        };

        let info: OrderInfo = serde_json::from_value(self.post("/orders/", &body).await?)?;
        tracing::debug!(order_id = %info.id, state = %info.state, "Robinhood order accepted");
        Ok(info)
    }

    /// Current details of an order.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn order_info(&self, order_id: &str) -> Result<OrderInfo> {
        let id = Self::validate_identifier(order_id)?;
        Ok(serde_json::from_value(
            self.get(&format!("/orders/{id}/"), &[]).await?,
        )?)
    }

    /// Requests cancellation of an order.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let id = Self::validate_identifier(order_id)?;
        self.post(&format!("/orders/{id}/cancel/"), &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderTracker for RobinhoodClient {
    async fn order_state(&mut self, order_id: &str) -> anyhow::Result<OrderState> {
        Ok(self.order_info(order_id).await?.order_state())
    }

    async fn cancel(&mut self, order_id: &str) -> anyhow::Result<()> {
        Ok(self.cancel_order(order_id).await?)
    }
}

/// Truncates to cents at or above $1, otherwise to four places.
fn format_price(price: Decimal) -> String {
    let dp = if price >= Decimal::ONE { 2 } else { 4 };
    let truncated = price.round_dp_with_strategy(dp, RoundingStrategy::ToZero);
    if dp == 2 {
        format!("{truncated:.2}")
    } else {
        format!("{truncated:.4}")
    }
}
