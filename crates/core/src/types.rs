//! Domain types shared by the brokerage integrations and the CLI.
//!
//! A [`TradeInstruction`] is one validated row of the batch file; a
//! [`TradeResult`] is what each executor reports back for it.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A field of a trade instruction that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} value: {value:?}")]
pub struct ParseFieldError {
    pub field: &'static str,
    pub value: String,
}

impl ParseFieldError {
    fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}

// =============================================================================
// Exchange
// =============================================================================

/// Brokerage an instruction is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Robinhood,
    Schwab,
}

impl Exchange {
    /// Display name used in results and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Robinhood => "Robinhood",
            Self::Schwab => "Schwab",
        }
    }
}

impl FromStr for Exchange {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hood" => Ok(Self::Robinhood),
            "sch" | "shh" | "schwab" => Ok(Self::Schwab),
            _ => Err(ParseFieldError::new("exchange", s)),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Action / Order Kind / Session
// =============================================================================

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl FromStr for Action {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(ParseFieldError::new("action", s)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type as written in the batch file.
///
/// `Last` is a limit order priced at the most recent trade and always
/// routed to the extended-hours session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
    Last,
}

impl OrderKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Last => "last",
        }
    }

    /// True for orders that carry a limit price (`limit` and `last`).
    #[must_use]
    pub fn is_priced(&self) -> bool {
        matches!(self, Self::Limit | Self::Last)
    }
}

impl FromStr for OrderKind {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            "last" => Ok(Self::Last),
            _ => Err(ParseFieldError::new("order_type", s)),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trading session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "ext")]
    Extended,
    #[serde(rename = "24")]
    AllDay,
}

impl Session {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Extended => "ext",
            Self::AllDay => "24",
        }
    }

    #[must_use]
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended | Self::AllDay)
    }
}

impl FromStr for Session {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "normal" => Ok(Self::Normal),
            "ext" => Ok(Self::Extended),
            "24" => Ok(Self::AllDay),
            _ => Err(ParseFieldError::new("session", s)),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Either a whole number of shares or a dollar amount (`$500`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Shares(u32),
    Dollars(Decimal),
}

impl Quantity {
    /// Converts a dollar amount to shares at `price`, rounding up.
    ///
    /// Share quantities are returned unchanged. Returns `None` when the
    /// price is not positive or the result does not fit.
    #[must_use]
    pub fn to_shares(&self, price: Decimal) -> Option<u32> {
        match self {
            Self::Shares(n) => Some(*n),
            Self::Dollars(amount) => {
                if price <= Decimal::ZERO {
                    return None;
                }
                (*amount / price).ceil().to_u32()
            }
        }
    }
}

impl FromStr for Quantity {
    type Err = ParseFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(amount) = trimmed.strip_prefix('$') {
            let dollars = Decimal::from_str(amount.trim())
                .map_err(|_| ParseFieldError::new("quantity", s))?;
            return Ok(Self::Dollars(dollars));
        }
        trimmed
            .parse::<u32>()
            .map(Self::Shares)
            .map_err(|_| ParseFieldError::new("quantity", s))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shares(n) => write!(f, "{n}"),
            Self::Dollars(d) => write!(f, "${d}"),
        }
    }
}

// =============================================================================
// Instructions and Results
// =============================================================================

/// One validated row of a batch file.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeInstruction {
    /// 1-based line number in the source file.
    pub line: usize,
    pub exchange: Exchange,
    pub ticker: String,
    pub action: Action,
    pub order_kind: OrderKind,
    pub quantity: Quantity,
    pub price: Option<Decimal>,
    pub session: Session,
}

impl TradeInstruction {
    /// Whether the order belongs in the extended-hours session.
    #[must_use]
    pub fn is_extended(&self) -> bool {
        self.order_kind == OrderKind::Last || self.session.is_extended()
    }
}

/// Outcome of a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Success,
    Failed,
}

impl TradeStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Per-instruction result, written to the CSV log and the JSON results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    pub exchange: String,
    pub ticker: String,
    pub action: String,
    pub order_type: String,
    pub quantity: String,
    pub price: Option<Decimal>,
    pub session: String,
    pub status: TradeStatus,
    pub message: String,
    pub order_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TradeResult {
    /// Starts a failed result for `instruction`; executors flip it to
    /// success once the order is accepted.
    ///
    /// `shares` replaces the written quantity once a dollar amount has
    /// been converted.
    #[must_use]
    pub fn pending(instruction: &TradeInstruction, shares: Option<u32>) -> Self {
        let quantity = match shares {
            Some(n) => n.to_string(),
            None => instruction.quantity.to_string(),
        };
        Self {
            exchange: instruction.exchange.name().to_string(),
            ticker: instruction.ticker.clone(),
            action: instruction.action.as_str().to_string(),
            order_type: instruction.order_kind.as_str().to_string(),
            quantity,
            price: instruction.price,
            session: instruction.session.as_str().to_string(),
            status: TradeStatus::Failed,
            message: String::new(),
            order_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Result for an instruction skipped because dry run is on.
    #[must_use]
    pub fn dry_run(instruction: &TradeInstruction, now: DateTime<Utc>) -> Self {
        let mut result = Self::pending(instruction, None);
        result.status = TradeStatus::Success;
        result.message = "DRY RUN - Trade not executed".to_string();
        result.order_id = Some(format!("dry_run_{}", now.timestamp()));
        result.timestamp = now;
        result
    }

    /// Marks the result failed with `message`.
    #[must_use]
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = TradeStatus::Failed;
        self.message = message.into();
        self
    }

    /// Marks the result successful with `message`.
    #[must_use]
    pub fn succeeded(mut self, message: impl Into<String>) -> Self {
        self.status = TradeStatus::Success;
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TradeStatus::Success
    }
}
