//! Waiting for priced orders to fill.
//!
//! Limit and extended-hours orders are polled until they fill, reach a
//! terminal state, or the wait times out. On timeout a cancel is attempted
//! so no order is left working unattended.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on any fill wait, whatever the configuration says.
pub const MAX_FILL_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between status polls.
pub const FILL_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            timeout: MAX_FILL_TIMEOUT,
            poll_interval: FILL_POLL_INTERVAL,
        }
    }
}

impl FillPolicy {
    /// Policy for a configured timeout, capped at [`MAX_FILL_TIMEOUT`].
    #[must_use]
    pub fn from_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs).min(MAX_FILL_TIMEOUT),
            poll_interval: FILL_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Order state as reported by a brokerage, reduced to what the wait needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    Filled,
    /// Cancelled, rejected or expired; carries the lower-cased status.
    Terminal(String),
    Working,
}

/// Brokerage operations used while waiting for a fill.
#[async_trait]
pub trait OrderTracker: Send {
    async fn order_state(&mut self, order_id: &str) -> Result<OrderState>;
    async fn cancel(&mut self, order_id: &str) -> Result<()>;
}

/// How a fill wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    Terminal(String),
    CancelledAfterTimeout,
    TimeoutCancelFailed,
}

impl FillOutcome {
    /// Short label recorded in trade results.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Filled => "filled",
            Self::Terminal(status) => status,
            Self::CancelledAfterTimeout => "cancelled_timeout",
            Self::TimeoutCancelFailed => "timeout_no_cancel",
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled)
    }
}

/// Polls `order_id` until it settles or `policy.timeout` passes.
///
/// Poll errors are logged and treated as "still working".
pub async fn wait_for_fill<T>(tracker: &mut T, order_id: &str, policy: FillPolicy) -> FillOutcome
where
    T: OrderTracker + ?Sized,
{
    let deadline = Instant::now() + policy.timeout;

    while Instant::now() < deadline {
        match tracker.order_state(order_id).await {
            Ok(OrderState::Filled) => {
                tracing::info!(%order_id, "order filled");
                return FillOutcome::Filled;
            }
            Ok(OrderState::Terminal(status)) => {
                tracing::warn!(%order_id, %status, "order ended without filling");
                return FillOutcome::Terminal(status);
            }
            Ok(OrderState::Working) => {
                tracing::debug!(%order_id, "order still working");
            }
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "error checking order status");
            }
        }
        tokio::time::sleep(policy.poll_interval).await;
    }

    tracing::warn!(%order_id, timeout_secs = policy.timeout.as_secs(), "order not filled in time, cancelling");
    match tracker.cancel(order_id).await {
        Ok(()) => FillOutcome::CancelledAfterTimeout,
        Err(e) => {
            tracing::error!(%order_id, error = %e, "failed to cancel order after timeout");
            FillOutcome::TimeoutCancelFailed
        }
    }
}
