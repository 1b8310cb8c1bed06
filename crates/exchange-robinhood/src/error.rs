//! Error types for the Robinhood integration.

use thiserror::Error;

/// Errors that can occur when interacting with Robinhood.
#[derive(Debug, Error)]
pub enum RobinhoodError {
    /// Login failed or no session is held.
    #[error("authentication error: {0}")]
    Authentication(String),

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

    /// Invalid order parameters.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// No instrument or quote for a symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// No brokerage account linked to the login.
    #[error("no account available: {0}")]
    NoAccount(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RobinhoodError {
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
}

impl From<reqwest::Error> for RobinhoodError {
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

impl From<serde_json::Error> for RobinhoodError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for Robinhood operations.
pub type Result<T> = std::result::Result<T, RobinhoodError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            RobinhoodError::api(400, "bad request").to_string(),
            "API error: 400 - bad request"
        );
        assert_eq!(
            RobinhoodError::rate_limit(30).to_string(),
            "rate limit exceeded, retry after 30s"
        );
    }
}
