//! Per-order risk limits.
//!
//! Every live order is checked against these before it reaches a broker.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum estimated order value in dollars.
pub const DEFAULT_MAX_ORDER_VALUE: f64 = 10_000.0;

/// An order rejected by [`RiskLimits`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Order value ${estimated:.2} exceeds maximum ${max}")]
pub struct RiskViolation {
    pub estimated: Decimal,
    pub max: Decimal,
}

/// Hard limits applied to each order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum estimated order value (price times shares).
    pub max_order_value: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_value: Decimal::from(10_000),
        }
    }
}

impl RiskLimits {
    /// Builds limits from the configured dollar ceiling.
    ///
    /// Non-finite values fall back to the default ceiling.
    #[must_use]
    pub fn from_max_order_value(max_order_value: f64) -> Self {
        Decimal::from_f64(max_order_value)
            .map(|max_order_value| Self { max_order_value })
            .unwrap_or_default()
    }

    /// Checks `price * shares` against the ceiling and returns the estimate.
    ///
    /// # Errors
    /// Returns [`RiskViolation`] if the estimated value exceeds the maximum.
    pub fn check_order_value(&self, price: Decimal, shares: u32) -> Result<Decimal, RiskViolation> {
        let estimated = price * Decimal::from(shares);
        if estimated > self.max_order_value {
            tracing::warn!(
                estimated = %estimated,
                max = %self.max_order_value,
                "order rejected by risk limits"
            );
            return Err(RiskViolation {
                estimated,
                max: self.max_order_value,
            });
        }
        Ok(estimated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_ceiling() {
        assert_eq!(RiskLimits::default().max_order_value, dec!(10000));
        assert_eq!(
            RiskLimits::from_max_order_value(DEFAULT_MAX_ORDER_VALUE),
            RiskLimits::default()
        );
    }

    #[test]
    fn test_order_within_limit() {
        let limits = RiskLimits::from_max_order_value(1000.0);
        assert_eq!(limits.check_order_value(dec!(100), 10), Ok(dec!(1000)));
    }

    #[test]
    fn test_order_over_limit() {
        let limits = RiskLimits::from_max_order_value(1000.0);
        let err = limits.check_order_value(dec!(100.01), 10).unwrap_err();
        assert_eq!(err.estimated, dec!(1000.10));
        assert_eq!(err.to_string(), "Order value $1000.10 exceeds maximum $1000");
    }

    #[test]
    fn test_non_finite_ceiling_uses_default() {
        assert_eq!(
            RiskLimits::from_max_order_value(f64::NAN),
            RiskLimits::default()
        );
    }
}
