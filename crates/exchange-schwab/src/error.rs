//! Error types for the Schwab integration.
//!
//! Besides the usual transport failures, the enum carries the credential
//! lifecycle errors the orchestrator reasons about. [`SchwabError::auth_signal`]
//! decides whether a failure should trigger re-authentication.

use std::path::PathBuf;
use thiserror::Error;

/// Case-insensitive markers that identify an authentication failure in an
/// otherwise unstructured error message.
pub const AUTH_KEYWORDS: [&str; 6] = ["token", "auth", "unauthorized", "forbidden", "401", "403"];

/// Errors that can occur when interacting with Schwab.
#[derive(Debug, Error)]
pub enum SchwabError {
    /// Credential file is missing, unparseable, or lacks a required field.
    #[error("invalid credential file {}: {reason}", path.display())]
    InvalidCredentialFile {
        /// Path of the credential file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The full OAuth flow failed. Not retried automatically.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No usable access token is held.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// An operation failed with an auth error and re-authentication also failed.
    #[error("failed to recover from authentication error during {operation}: {source}")]
    AuthRecoveryFailed {
        /// Operation that first failed.
        operation: String,
        /// The re-authentication error.
        #[source]
        source: Box<SchwabError>,
    },

    /// Identifier matched no known account.
    #[error("unknown Schwab account identifier: {0:?}")]
    UnknownAccount(String),

    /// Order type/action combination that cannot be expressed.
    #[error("unsupported order shape: {0}")]
    UnsupportedOrderShape(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error body from the API.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Unstructured failure from a transport.
    #[error("{0}")]
    Transport(String),

    /// Path segment failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Quote response did not contain a usable price.
    #[error("no last price in quote for {0}")]
    MissingQuote(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether an error should be treated as an authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    Auth,
    NotAuth,
}

impl SchwabError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a rate limit error.
    pub fn rate_limit(retry_after_secs: u64) -> Self {
        Self::RateLimit { retry_after_secs }
    }

    /// Creates an invalid credential file error.
    pub fn invalid_credentials(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidCredentialFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classifies the error for the re-authentication policy.
    ///
    /// Structured variants carry their own tag. Variants without one fall
    /// back to scanning the message for [`AUTH_KEYWORDS`].
    #[must_use]
    pub fn auth_signal(&self) -> AuthSignal {
        match self {
            Self::Api {
                status_code: 401 | 403,
                ..
            }
            | Self::InvalidCredentialFile { .. }
            | Self::AuthenticationFailed(_)
            | Self::NotAuthenticated(_) => AuthSignal::Auth,
            Self::AuthRecoveryFailed { .. }
            | Self::RateLimit { .. }
            | Self::UnknownAccount(_)
            | Self::UnsupportedOrderShape(_)
            | Self::InvalidIdentifier(_)
            | Self::MissingQuote(_)
            | Self::Configuration(_)
            | Self::Io(_) => AuthSignal::NotAuth,
            Self::Api { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::Transport(_)
            | Self::Serialization(_) => message_signal(&self.to_string()),
        }
    }

    /// Returns true if the error should trigger re-authentication.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.auth_signal() == AuthSignal::Auth
    }
}

/// Keyword heuristic for unstructured error messages.
#[must_use]
pub fn message_signal(message: &str) -> AuthSignal {
    let lower = message.to_lowercase();
    if AUTH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        AuthSignal::Auth
    } else {
        AuthSignal::NotAuth
    }
}

impl From<reqwest::Error> for SchwabError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SchwabError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Schwab operations.
pub type Result<T> = std::result::Result<T, SchwabError>;
