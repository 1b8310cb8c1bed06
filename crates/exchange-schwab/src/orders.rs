//! Equity order payloads.

use crate::error::{Result, SchwabError};
use batch_trade_core::{Action, OrderKind};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// Trading session. `Seamless` covers pre-market, regular and after-hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSession {
    Normal,
    Seamless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    Buy,
    Sell,
}

impl From<Action> for Instruction {
    fn from(action: Action) -> Self {
        match action {
            Action::Buy => Self::Buy,
            Action::Sell => Self::Sell,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub symbol: String,
    pub asset_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLeg {
    pub instruction: Instruction,
    pub quantity: u32,
    pub instrument: Instrument,
}

/// Body of `POST /trader/v1/accounts/{hash}/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    pub order_type: OrderType,
    pub session: OrderSession,
    pub duration: String,
    pub order_strategy_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub order_leg_collection: Vec<OrderLeg>,
}

impl OrderSpec {
    /// Single-leg equity order.
    ///
    /// Market orders ignore `price` and always trade in the normal session.
    /// Limit and last orders need a positive price; `extended` moves them
    /// to the seamless session.
    ///
    /// # Errors
    /// Returns [`SchwabError::UnsupportedOrderShape`] for zero shares, an
    /// empty symbol, or a priced order without a positive price.
    pub fn equity(
        action: Action,
        kind: OrderKind,
        symbol: &str,
        shares: u32,
        price: Option<Decimal>,
        extended: bool,
    ) -> Result<Self> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(SchwabError::UnsupportedOrderShape("empty symbol".to_string()));
        }
        if shares == 0 {
            return Err(SchwabError::UnsupportedOrderShape(format!(
                "{kind:?} {action:?} {symbol} for zero shares"
            )));
        }

        let (order_type, session, price) = match kind {
            OrderKind::Market => (OrderType::Market, OrderSession::Normal, None),
            OrderKind::Limit | OrderKind::Last => {
                let price = price.filter(|p| *p > Decimal::ZERO).ok_or_else(|| {
                    SchwabError::UnsupportedOrderShape(format!(
                        "{kind:?} {action:?} {symbol} requires a positive price"
                    ))
                })?;
                let session = if extended {
                    OrderSession::Seamless
                } else {
                    OrderSession::Normal
                };
                (OrderType::Limit, session, Some(format_price(price)))
            }
        };

        Ok(Self {
            order_type,
            session,
            duration: "DAY".to_string(),
            order_strategy_type: "SINGLE".to_string(),
            price,
            order_leg_collection: vec![OrderLeg {
                instruction: action.into(),
                quantity: shares,
                instrument: Instrument {
                    symbol,
                    asset_type: "EQUITY".to_string(),
                },
            }],
        })
    }

    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.order_leg_collection
            .first()
            .map(|leg| leg.instrument.symbol.as_str())
    }
}

/// Truncates to cents at or above $1, to hundredths of a cent below.
fn format_price(price: Decimal) -> String {
    if price >= Decimal::ONE {
        format!("{:.2}", price.round_dp_with_strategy(2, RoundingStrategy::ToZero))
    } else {
        format!("{:.4}", price.round_dp_with_strategy(4, RoundingStrategy::ToZero))
    }
}
