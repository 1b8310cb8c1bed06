//! Shared building blocks for batch equity order placement.
//!
//! - [`types`]: instructions, results, and their parsed fields
//! - [`config`] and [`config_loader`]: the JSON configuration file
//! - [`risk`]: per-order value limits
//! - [`fill`]: polling priced orders until they fill or time out
//! - [`traits`]: the [`TradeExecutor`] seam each brokerage implements

pub mod config;
pub mod config_loader;
pub mod fill;
pub mod risk;
pub mod traits;
pub mod types;

pub use config::{AppConfig, RobinhoodConfig, SchwabConfig, TradingConfig};
pub use config_loader::{ConfigLoader, ENV_PREFIX};
pub use fill::{wait_for_fill, FillOutcome, FillPolicy, OrderState, OrderTracker};
pub use risk::{RiskLimits, RiskViolation};
pub use traits::TradeExecutor;
pub use types::{
    Action, Exchange, OrderKind, ParseFieldError, Quantity, Session, TradeInstruction,
    TradeResult, TradeStatus,
};
