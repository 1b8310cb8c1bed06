use crate::types::{Exchange, TradeInstruction, TradeResult};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A brokerage that can price and execute batch instructions.
///
/// Implementations never return an error from [`TradeExecutor::execute`];
/// failures are reported in the [`TradeResult`] so the batch can continue.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Most recent traded price for `ticker`.
    async fn latest_price(&mut self, ticker: &str) -> Result<Decimal>;

    /// Executes `instruction` for a whole number of `shares`.
    async fn execute(&mut self, instruction: &TradeInstruction, shares: u32) -> TradeResult;
}
