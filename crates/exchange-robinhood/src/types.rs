//! Order types for the Robinhood API.

use batch_trade_core::{Action, OrderKind, OrderState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Time in Force
// =============================================================================

/// The two time-in-force codes Robinhood accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good for day.
    Gfd,
    /// Good till cancelled.
    Gtc,
}

impl TimeInForce {
    /// Maps a configured value (`DAY`, `GTC`, ...) to a code valid for `kind`.
    ///
    /// Unknown values become `gfd`. Market orders are never `gtc`.
    #[must_use]
    pub fn resolve(configured: &str, kind: OrderKind) -> Self {
        let tif = match configured.trim().to_lowercase().as_str() {
            "gtc" | "good_till_cancel" | "good_till_cancelled" | "good_till_canceled" => Self::Gtc,
            _ => Self::Gfd,
        };
        if kind == OrderKind::Market {
            Self::Gfd
        } else {
            tif
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gfd => "gfd",
            Self::Gtc => "gtc",
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl From<Action> for Side {
    fn from(action: Action) -> Self {
        match action {
            Action::Buy => Self::Buy,
            Action::Sell => Self::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// An order before account and instrument details are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: u32,
    /// Limit price; market orders are collared at the last trade price.
    pub price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub extended_hours: bool,
}

impl OrderRequest {
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: Side, quantity: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            time_in_force: TimeInForce::Gfd,
            extended_hours: false,
        }
    }

    #[must_use]
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: u32, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            time_in_force: TimeInForce::Gfd,
            extended_hours: false,
        }
    }

    #[must_use]
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    #[must_use]
    pub fn with_extended_hours(mut self, extended: bool) -> Self {
        self.extended_hours = extended;
        self
    }
}

/// Wire body of `POST /orders/`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct OrderBody<'a> {
    pub account: &'a str,
    pub instrument: &'a str,
    pub symbol: &'a str,
    pub price: String,
    pub quantity: u32,
    pub ref_id: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub trigger: &'static str,
    pub side: Side,
    pub extended_hours: bool,
    pub market_hours: &'static str,
}

/// An order as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderInfo {
    pub id: String,
    #[serde(default)]
    pub state: String,
}

impl OrderInfo {
    /// Reduces the order state for the fill wait.
    #[must_use]
    pub fn order_state(&self) -> OrderState {
        match self.state.as_str() {
            "filled" => OrderState::Filled,
            "cancelled" | "rejected" | "failed" => OrderState::Terminal(self.state.clone()),
            _ => OrderState::Working,
        }
    }
}
