//! Schwab integration for batch order placement.
//!
//! The credential lifecycle is the heart of this crate:
//!
//! - [`credentials`]: the persisted OAuth record and its backups
//! - [`token_health`]: age-based classification and status reports
//! - [`auth`]: the [`AuthOrchestrator`] state machine and [`TokenProvider`] seam
//! - [`accounts`]: fuzzy account identifiers resolved to hashes
//! - [`broker`]: the [`SchwabBroker`] facade that re-authenticates once on auth errors
//!
//! Around it sit the REST [`client`], the OAuth token endpoint in [`oauth`],
//! order payloads in [`orders`], and the [`SchwabExecutor`] used by the batch runner.

pub mod accounts;
pub mod auth;
pub mod broker;
pub mod client;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod oauth;
pub mod orders;
pub mod token_health;
pub mod transport;

pub use accounts::{AccountIdentifierMap, AccountRecord, AccountResolver};
pub use auth::{
    AccessToken, Attempt, AuthConfig, AuthOrchestrator, AuthState, TokenProvider, EXPIRY_MARGIN_SECS,
};
pub use broker::SchwabBroker;
pub use client::{SchwabClientConfig, SchwabHttpClient, SCHWAB_API_URL};
pub use credentials::{CredentialFile, CredentialRecord, CredentialStore, BACKUP_INFIX};
pub use error::{AuthSignal, Result, SchwabError};
pub use executor::SchwabExecutor;
pub use oauth::{SchwabOAuth, SchwabOAuthConfig};
pub use orders::{OrderSession, OrderSpec, OrderType};
pub use token_health::{
    classify, classify_file, TokenHealth, TokenStatus, DEFAULT_REFRESH_THRESHOLD_DAYS,
    HARD_EXPIRY_DAYS,
};
pub use transport::{
    last_price, order_id_from_location, OrderSnapshot, PlacementResponse, SchwabTransport,
};
