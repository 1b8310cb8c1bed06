//! Order execution facade.
//!
//! [`SchwabBroker`] puts the auth orchestrator and the account resolver in
//! front of a [`SchwabTransport`]. Every call is attempted once; if it
//! fails with an auth-related error the orchestrator re-authenticates and
//! the call is made exactly one more time.

use crate::accounts::AccountResolver;
use crate::auth::{Attempt, AuthOrchestrator, TokenProvider};
use crate::error::{Result, SchwabError};
use crate::orders::OrderSpec;
use crate::token_health::TokenStatus;
use crate::transport::{last_price, OrderSnapshot, SchwabTransport};
use async_trait::async_trait;
use batch_trade_core::{wait_for_fill, FillOutcome, FillPolicy, OrderState, OrderTracker};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;

pub struct SchwabBroker<T, P> {
    auth: AuthOrchestrator<P>,
    resolver: AccountResolver,
    transport: T,
}

impl<T, P> std::fmt::Debug for SchwabBroker<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabBroker")
            .field("auth", &self.auth)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl<T: SchwabTransport, P: TokenProvider> SchwabBroker<T, P> {
    /// Wraps an orchestrator and transport without touching either.
    #[must_use]
    pub fn new(auth: AuthOrchestrator<P>, transport: T) -> Self {
        Self {
            auth,
            resolver: AccountResolver::new(),
            transport,
        }
    }

    /// Initializes credentials and returns a ready broker.
    ///
    /// # Errors
    /// Returns [`SchwabError::AuthenticationFailed`] if no credentials can be obtained.
    pub async fn connect(auth: AuthOrchestrator<P>, transport: T) -> Result<Self> {
        let mut broker = Self::new(auth, transport);
        broker.auth.initialize().await?;
        Ok(broker)
    }

    #[must_use]
    pub fn auth(&self) -> &AuthOrchestrator<P> {
        &self.auth
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Credential status report. Never fails and never authenticates.
    #[must_use]
    pub fn token_status(&self) -> TokenStatus {
        self.auth.token_status()
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Populates the identifier map if needed.
    ///
    /// # Errors
    /// Returns the listing error after one recovery attempt.
    pub async fn ensure_accounts(&mut self) -> Result<()> {
        self.resolver
            .ensure_populated(&self.transport, &mut self.auth, false)
            .await
    }

    /// Re-fetches the account listing.
    ///
    /// # Errors
    /// Returns the listing error after one recovery attempt.
    pub async fn refresh_accounts(&mut self) -> Result<()> {
        self.resolver
            .ensure_populated(&self.transport, &mut self.auth, true)
            .await
    }

    /// Every known identifier.
    ///
    /// # Errors
    /// Returns the listing error if the map could not be populated.
    pub async fn list_identifiers(&mut self) -> Result<Vec<String>> {
        self.ensure_accounts().await?;
        Ok(self
            .resolver
            .map()
            .map(|m| m.identifiers().to_vec())
            .unwrap_or_default())
    }

    /// Canonical hash for `identifier` from the cached map.
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> Option<String> {
        self.resolver.resolve(identifier)
    }

    /// Populates the map if needed, then resolves `identifier`.
    ///
    /// # Errors
    /// Returns the listing error if the map could not be populated.
    pub async fn lookup_hash(&mut self, identifier: &str) -> Result<Option<String>> {
        self.ensure_accounts().await?;
        Ok(self.resolve(identifier))
    }

    /// Aliases grouped by account hash.
    ///
    /// # Errors
    /// Returns the listing error if the map could not be populated.
    pub async fn accounts_by_hash(&mut self) -> Result<BTreeMap<String, Vec<String>>> {
        self.ensure_accounts().await?;
        Ok(self
            .resolver
            .map()
            .map(|m| m.aliases_by_hash())
            .unwrap_or_default())
    }

    // =========================================================================
    // Market Data
    // =========================================================================

    /// Raw quote response for `symbol`.
    ///
    /// # Errors
    /// Returns the transport error, or [`SchwabError::AuthRecoveryFailed`].
    pub async fn get_quote(&mut self, symbol: &str) -> Result<Value> {
        let first = match self.auth.access_token().await {
            Ok(token) => self.transport.quote(&token, symbol).await,
            Err(e) => Err(e),
        };
        match self.auth.intercept(first, "quote request").await? {
            Attempt::Done(quote) => Ok(quote),
            Attempt::Retry => {
                let token = self.auth.access_token().await?;
                self.transport.quote(&token, symbol).await
            }
        }
    }

    /// Last traded price for `symbol`.
    ///
    /// # Errors
    /// See [`get_quote`](Self::get_quote); also [`SchwabError::MissingQuote`].
    pub async fn last_price(&mut self, symbol: &str) -> Result<Decimal> {
        let quote = self.get_quote(symbol).await?;
        last_price(&quote, symbol)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Places `order` against the account `identifier` resolves to.
    ///
    /// Returns `Ok(None)` when the order was accepted but no order id could
    /// be read from the response.
    ///
    /// # Errors
    /// Returns [`SchwabError::UnknownAccount`] before any transport call if
    /// the identifier is unknown; otherwise the transport or recovery error.
    pub async fn place_order(&mut self, order: &OrderSpec, identifier: &str) -> Result<Option<String>> {
        self.ensure_accounts().await?;
        let hash = self
            .resolve(identifier)
            .ok_or_else(|| SchwabError::UnknownAccount(identifier.to_string()))?;

        let first = match self.auth.access_token().await {
            Ok(token) => self.transport.place_order(&token, &hash, order).await,
            Err(e) => Err(e),
        };
        let response = match self.auth.intercept(first, "order placement").await? {
            Attempt::Done(response) => response,
            Attempt::Retry => {
                let token = self.auth.access_token().await?;
                self.transport.place_order(&token, &hash, order).await?
            }
        };

        let order_id = response.order_id();
        match &order_id {
            Some(id) => tracing::info!(order_id = %id, account = %hash, "order placed"),
            None => tracing::warn!(
                status = response.status,
                location = ?response.location,
                "order accepted without a usable order id"
            ),
        }
        Ok(order_id)
    }

    /// Current status of an order.
    ///
    /// # Errors
    /// Returns the transport or recovery error.
    pub async fn order_status(&mut self, account_hash: &str, order_id: &str) -> Result<OrderSnapshot> {
        let first = match self.auth.access_token().await {
            Ok(token) => self.transport.order_status(&token, account_hash, order_id).await,
            Err(e) => Err(e),
        };
        match self.auth.intercept(first, "order status").await? {
            Attempt::Done(snapshot) => Ok(snapshot),
            Attempt::Retry => {
                let token = self.auth.access_token().await?;
                self.transport.order_status(&token, account_hash, order_id).await
            }
        }
    }

    /// Cancels an order.
    ///
    /// # Errors
    /// Returns the transport or recovery error.
    pub async fn cancel_order(&mut self, account_hash: &str, order_id: &str) -> Result<()> {
        let first = match self.auth.access_token().await {
            Ok(token) => self.transport.cancel_order(&token, account_hash, order_id).await,
            Err(e) => Err(e),
        };
        match self.auth.intercept(first, "order cancellation").await? {
            Attempt::Done(()) => Ok(()),
            Attempt::Retry => {
                let token = self.auth.access_token().await?;
                self.transport.cancel_order(&token, account_hash, order_id).await
            }
        }
    }

    /// Polls an order until it fills, settles, or `policy` times out.
    pub async fn wait_for_fill(&mut self, account_hash: &str, order_id: &str, policy: FillPolicy) -> FillOutcome {
        let mut tracker = BrokerTracker {
            broker: self,
            account_hash,
        };
        wait_for_fill(&mut tracker, order_id, policy).await
    }
}

struct BrokerTracker<'a, T, P> {
    broker: &'a mut SchwabBroker<T, P>,
    account_hash: &'a str,
}

#[async_trait]
impl<T: SchwabTransport, P: TokenProvider> OrderTracker for BrokerTracker<'_, T, P> {
    async fn order_state(&mut self, order_id: &str) -> anyhow::Result<OrderState> {
        let snapshot = self.broker.order_status(self.account_hash, order_id).await?;
        Ok(if snapshot.is_filled() {
            OrderState::Filled
        } else if snapshot.is_terminal() {
            OrderState::Terminal(snapshot.status.to_lowercase())
        } else {
            OrderState::Working
        })
    }

    async fn cancel(&mut self, order_id: &str) -> anyhow::Result<()> {
        self.broker.cancel_order(self.account_hash, order_id).await?;
        Ok(())
    }
}
