//! The Schwab trader API as seen by the broker.
//!
//! [`SchwabHttpClient`](crate::client::SchwabHttpClient) is the production
//! implementation; tests substitute in-memory fakes.

use crate::accounts::AccountRecord;
use crate::auth::AccessToken;
use crate::error::{Result, SchwabError};
use crate::orders::OrderSpec;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// Response to an order placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementResponse {
    pub status: u16,
    /// The `Location` header, which ends with the new order id.
    pub location: Option<String>,
}

impl PlacementResponse {
    /// Order id parsed from the `Location` header.
    #[must_use]
    pub fn order_id(&self) -> Option<String> {
        self.location.as_deref().and_then(order_id_from_location)
    }
}

/// The fields of an order status response the wait loop needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderSnapshot {
    #[serde(default)]
    pub status: String,
}

impl OrderSnapshot {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status.eq_ignore_ascii_case("FILLED")
    }

    /// Statuses after which the order can no longer fill.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.to_ascii_uppercase().as_str(),
            "CANCELED" | "REJECTED" | "EXPIRED" | "REPLACED"
        )
    }
}

/// Authenticated calls against the trader API.
#[async_trait]
pub trait SchwabTransport: Send + Sync {
    /// Accounts linked to the credentials.
    async fn account_numbers(&self, token: &AccessToken) -> Result<Vec<AccountRecord>>;

    /// Raw quote response for one symbol.
    async fn quote(&self, token: &AccessToken, symbol: &str) -> Result<Value>;

    async fn place_order(
        &self,
        token: &AccessToken,
        account_hash: &str,
        order: &OrderSpec,
    ) -> Result<PlacementResponse>;

    async fn order_status(
        &self,
        token: &AccessToken,
        account_hash: &str,
        order_id: &str,
    ) -> Result<OrderSnapshot>;

    async fn cancel_order(&self, token: &AccessToken, account_hash: &str, order_id: &str) -> Result<()>;
}

/// Reads `[symbol].quote.lastPrice` from a quote response.
///
/// # Errors
/// Returns [`SchwabError::MissingQuote`] if the field is absent or not a number.
pub fn last_price(quote: &Value, symbol: &str) -> Result<Decimal> {
    let price = quote
        .get(symbol)
        .and_then(|q| q.get("quote"))
        .and_then(|q| q.get("lastPrice"))
        .ok_or_else(|| SchwabError::MissingQuote(symbol.to_string()))?;

    match price {
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .map_err(|_| SchwabError::MissingQuote(symbol.to_string())),
        Value::String(s) => s
            .parse::<Decimal>()
            .map_err(|_| SchwabError::MissingQuote(symbol.to_string())),
        _ => Err(SchwabError::MissingQuote(symbol.to_string())),
    }
}

/// Last path segment of an order `Location` header.
#[must_use]
pub fn order_id_from_location(location: &str) -> Option<String> {
    let trimmed = location.trim().trim_end_matches('/');
    if trimmed.ends_with("/orders") {
        return None;
    }
    trimmed
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
