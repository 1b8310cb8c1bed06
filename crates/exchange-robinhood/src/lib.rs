//! Robinhood integration for batch order placement.
//!
//! - [`client`]: REST client with password-grant login
//! - [`types`]: order requests and time-in-force mapping
//! - [`executor`]: the [`RobinhoodExecutor`] used by the batch runner

pub mod client;
pub mod error;
pub mod executor;
pub mod types;

pub use client::{RobinhoodClient, RobinhoodClientConfig, ROBINHOOD_API_URL};
pub use error::{Result, RobinhoodError};
pub use executor::RobinhoodExecutor;
pub use types::{OrderInfo, OrderRequest, OrderType, Side, TimeInForce};
