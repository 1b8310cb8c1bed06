//! Sequential batch execution.
//!
//! Each instruction runs to completion before the next begins. Executors
//! are connected lazily, the first time their exchange is needed.

use crate::results::{pass_fail, CsvLog};
use anyhow::Result;
use async_trait::async_trait;
use batch_trade_core::{
    AppConfig, Exchange, Quantity, TradeExecutor, TradeInstruction, TradeResult, TradingConfig,
};
use batch_trade_robinhood::RobinhoodExecutor;
use batch_trade_schwab::SchwabExecutor;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;

/// Closing remark printed after every batch.
pub const SEQUENTIAL_NOTE: &str = "NOTE: All orders were processed sequentially. Parallel execution is possible but is not implemented to ensure predictable sequencing and API rate-limit safety.";

/// Connects brokerage executors on demand.
#[async_trait]
pub trait ExecutorFactory: Send {
    async fn connect(&mut self, exchange: Exchange) -> Result<Box<dyn TradeExecutor>>;
}

/// Factory for the real brokerages.
#[derive(Debug, Clone)]
pub struct LiveExecutors {
    config: AppConfig,
}

impl LiveExecutors {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutorFactory for LiveExecutors {
    async fn connect(&mut self, exchange: Exchange) -> Result<Box<dyn TradeExecutor>> {
        let executor: Box<dyn TradeExecutor> = match exchange {
            Exchange::Robinhood => Box::new(RobinhoodExecutor::connect(&self.config).await?),
            Exchange::Schwab => Box::new(SchwabExecutor::connect(&self.config).await?),
        };
        Ok(executor)
    }
}

/// Runs instructions one after another against lazily connected executors.
pub struct BatchRunner<F> {
    trading: TradingConfig,
    factory: F,
    executors: HashMap<Exchange, Box<dyn TradeExecutor>>,
    log: CsvLog,
}

impl<F: ExecutorFactory> BatchRunner<F> {
    pub fn new(trading: TradingConfig, factory: F) -> Self {
        let log = CsvLog::new(trading.csv_log_file.clone());
        tracing::debug!(path = %log.path().display(), "appending results to CSV log");
        Self {
            trading,
            factory,
            executors: HashMap::new(),
            log,
        }
    }

    /// Processes every instruction and returns one result per instruction.
    pub async fn run(&mut self, instructions: &[TradeInstruction]) -> Vec<TradeResult> {
        let mut results = Vec::with_capacity(instructions.len());
        let total = instructions.len();

        for (index, instruction) in instructions.iter().enumerate() {
            tracing::info!(
                trade = index + 1,
                total,
                action = %instruction.action,
                quantity = %instruction.quantity,
                ticker = %instruction.ticker,
                exchange = %instruction.exchange,
                order_type = %instruction.order_kind,
                "processing trade"
            );

            let (result, executed) = self.process(instruction).await;
            self.log.append(&result);
            if executed {
                println!(
                    "{} {} {} {} ({}) - {}",
                    pass_fail(&result),
                    result.exchange,
                    instruction.ticker,
                    result.action.to_uppercase(),
                    result.order_type,
                    result.message
                );
            } else {
                println!("FAIL {} {}: {}", result.exchange, instruction.ticker, result.message);
            }
            results.push(result);

            if executed && self.trading.trade_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.trading.trade_delay_ms)).await;
            }
        }

        println!("\n{SEQUENTIAL_NOTE}");
        results
    }

    /// Returns the result and whether an order was attempted.
    async fn process(&mut self, instruction: &TradeInstruction) -> (TradeResult, bool) {
        if self.trading.dry_run {
            tracing::info!(
                action = %instruction.action,
                quantity = %instruction.quantity,
                ticker = %instruction.ticker,
                exchange = %instruction.exchange,
                "DRY RUN"
            );
            return (TradeResult::dry_run(instruction, Utc::now()), true);
        }

        let exchange = instruction.exchange;
        let Some(executor) = self.executor(exchange).await else {
            let result = TradeResult::pending(instruction, None)
                .failed(format!("{} not initialized", exchange.name()));
            return (result, false);
        };

        let shares = match instruction.quantity {
            Quantity::Shares(n) => n,
            Quantity::Dollars(amount) => match convert_dollars(executor.as_mut(), instruction).await {
                Ok(shares) => shares,
                Err(e) => {
                    tracing::error!(error = %e, "error converting dollar amount to shares");
                    let result = TradeResult::pending(instruction, None)
                        .failed(format!("Error converting ${amount} to shares: {e}"));
                    return (result, false);
                }
            },
        };

        (executor.execute(instruction, shares).await, true)
    }

    async fn executor(&mut self, exchange: Exchange) -> Option<&mut Box<dyn TradeExecutor>> {
        if !self.executors.contains_key(&exchange) {
            match self.factory.connect(exchange).await {
                Ok(executor) => {
                    tracing::info!(exchange = %exchange, "executor initialised");
                    self.executors.insert(exchange, executor);
                }
                Err(e) => {
                    tracing::error!(exchange = %exchange, error = %e, "error initialising executor");
                    return None;
                }
            }
        }
        self.executors.get_mut(&exchange)
    }
}

/// Whole shares for a dollar amount at the latest price, rounded up.
async fn convert_dollars(executor: &mut dyn TradeExecutor, instruction: &TradeInstruction) -> Result<u32> {
    let price = executor.latest_price(&instruction.ticker).await?;
    let shares = instruction
        .quantity
        .to_shares(price)
        .ok_or_else(|| anyhow::anyhow!("cannot convert at price {price}"))?;
    tracing::info!(
        amount = %instruction.quantity,
        shares,
        ticker = %instruction.ticker,
        price = %price.round_dp(2),
        "converted dollar amount to shares"
    );
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_trade_core::{Action, OrderKind, Session, TradeStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Executor that records the share counts it was asked to trade.
    struct RecordingExecutor {
        exchange: Exchange,
        price: Option<Decimal>,
        executed: Arc<Mutex<Vec<(String, u32)>>>,
    }

    #[async_trait]
    impl TradeExecutor for RecordingExecutor {
        fn exchange(&self) -> Exchange {
            self.exchange
        }

        async fn latest_price(&mut self, _ticker: &str) -> Result<Decimal> {
            self.price.ok_or_else(|| anyhow::anyhow!("no quote"))
        }

        async fn execute(&mut self, instruction: &TradeInstruction, shares: u32) -> TradeResult {
            self.executed
                .lock()
                .unwrap()
                .push((instruction.ticker.clone(), shares));
            TradeResult::pending(instruction, Some(shares)).succeeded("Market order submitted")
        }
    }

    #[derive(Clone, Default)]
    struct FakeFactory {
        connects: Arc<Mutex<Vec<Exchange>>>,
        executed: Arc<Mutex<Vec<(String, u32)>>>,
        unavailable: Option<Exchange>,
        price: Option<Decimal>,
    }

    #[async_trait]
    impl ExecutorFactory for FakeFactory {
        async fn connect(&mut self, exchange: Exchange) -> Result<Box<dyn TradeExecutor>> {
            self.connects.lock().unwrap().push(exchange);
            if self.unavailable == Some(exchange) {
                anyhow::bail!("login failed");
            }
            Ok(Box::new(RecordingExecutor {
                exchange,
                price: self.price,
                executed: Arc::clone(&self.executed),
            }))
        }
    }

    fn instruction(exchange: Exchange, ticker: &str, quantity: Quantity) -> TradeInstruction {
        TradeInstruction {
            line: 1,
            exchange,
            ticker: ticker.to_string(),
            action: Action::Buy,
            order_kind: OrderKind::Market,
            quantity,
            price: None,
            session: Session::Normal,
        }
    }

    fn trading(dir: &TempDir, dry_run: bool) -> TradingConfig {
        TradingConfig {
            dry_run,
            csv_log_file: dir.path().join("order_log.csv"),
            trade_delay_ms: 0,
            ..TradingConfig::default()
        }
    }

    // ==================== Dry Run Tests ====================

    #[tokio::test]
    async fn test_dry_run_never_connects() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::default();
        let mut runner = BatchRunner::new(trading(&dir, true), factory.clone());

        let results = runner
            .run(&[
                instruction(Exchange::Schwab, "AAPL", Quantity::Shares(1)),
                instruction(Exchange::Robinhood, "MSFT", Quantity::Dollars(dec!(500))),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.message == "DRY RUN - Trade not executed"));
        assert!(results[0].order_id.as_deref().unwrap().starts_with("dry_run_"));
        assert!(factory.connects.lock().unwrap().is_empty());
        assert!(dir.path().join("order_log.csv").exists());
    }

    // ==================== Live Run Tests ====================

    #[tokio::test]
    async fn test_executors_connect_once_per_exchange() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory {
            price: Some(dec!(100)),
            ..FakeFactory::default()
        };
        let mut runner = BatchRunner::new(trading(&dir, false), factory.clone());

        runner
            .run(&[
                instruction(Exchange::Schwab, "AAPL", Quantity::Shares(1)),
                instruction(Exchange::Schwab, "MSFT", Quantity::Shares(2)),
                instruction(Exchange::Robinhood, "NVDA", Quantity::Shares(3)),
            ])
            .await;

        assert_eq!(
            *factory.connects.lock().unwrap(),
            vec![Exchange::Schwab, Exchange::Robinhood]
        );
        assert_eq!(factory.executed.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dollar_amount_rounds_up_to_whole_shares() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory {
            price: Some(dec!(150)),
            ..FakeFactory::default()
        };
        let mut runner = BatchRunner::new(trading(&dir, false), factory.clone());

        let results = runner
            .run(&[instruction(Exchange::Robinhood, "MSFT", Quantity::Dollars(dec!(500)))])
            .await;

        assert_eq!(*factory.executed.lock().unwrap(), vec![("MSFT".to_string(), 4)]);
        assert_eq!(results[0].quantity, "4");
    }

    #[tokio::test]
    async fn test_conversion_failure_continues_batch() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory::default();
        let mut runner = BatchRunner::new(trading(&dir, false), factory.clone());

        let results = runner
            .run(&[
                instruction(Exchange::Schwab, "GOOGL", Quantity::Dollars(dec!(1000))),
                instruction(Exchange::Schwab, "AAPL", Quantity::Shares(1)),
            ])
            .await;

        assert_eq!(results[0].status, TradeStatus::Failed);
        assert_eq!(results[0].message, "Error converting $1000 to shares: no quote");
        assert_eq!(results[0].quantity, "$1000");
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_unavailable_exchange_fails_its_trades_only() {
        let dir = TempDir::new().unwrap();
        let factory = FakeFactory {
            unavailable: Some(Exchange::Robinhood),
            ..FakeFactory::default()
        };
        let mut runner = BatchRunner::new(trading(&dir, false), factory.clone());

        let results = runner
            .run(&[
                instruction(Exchange::Robinhood, "AAPL", Quantity::Shares(1)),
                instruction(Exchange::Schwab, "MSFT", Quantity::Shares(1)),
            ])
            .await;

        assert_eq!(results[0].message, "Robinhood not initialized");
        assert_eq!(results[0].exchange, "Robinhood");
        assert!(results[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trades_are_spaced_by_delay() {
        let dir = TempDir::new().unwrap();
        let mut config = trading(&dir, false);
        config.trade_delay_ms = 1000;
        let mut runner = BatchRunner::new(config, FakeFactory::default());

        let start = tokio::time::Instant::now();
        runner
            .run(&[
                instruction(Exchange::Schwab, "AAPL", Quantity::Shares(1)),
                instruction(Exchange::Schwab, "MSFT", Quantity::Shares(1)),
            ])
            .await;

        assert!(start.elapsed() >= Duration::from_millis(2000));
    }
}
