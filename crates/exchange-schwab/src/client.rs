//! Schwab trader and market data REST client with rate limiting.
//!
//! # Example
//!
//! ```ignore
//! use batch_trade_schwab::{SchwabClientConfig, SchwabHttpClient, SchwabTransport};
//!
//! let client = SchwabHttpClient::new(SchwabClientConfig::default())?;
//! let accounts = client.account_numbers(&token).await?;
//! ```

use crate::accounts::AccountRecord;
use crate::auth::AccessToken;
use crate::error::{Result, SchwabError};
use crate::orders::OrderSpec;
use crate::transport::{OrderSnapshot, PlacementResponse, SchwabTransport};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// Schwab API base URL.
pub const SCHWAB_API_URL: &str = "https://api.schwabapi.com";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Schwab client.
#[derive(Debug, Clone)]
pub struct SchwabClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Requests per minute limit.
    pub requests_per_minute: NonZeroU32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SchwabClientConfig {
    fn default() -> Self {
        Self {
            base_url: SCHWAB_API_URL.to_string(),
            requests_per_minute: nonzero!(120u32),
            timeout_secs: 30,
        }
    }
}

impl SchwabClientConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.requests_per_minute = requests_per_minute;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// =============================================================================
// SchwabHttpClient
// =============================================================================

/// REST implementation of [`SchwabTransport`].
pub struct SchwabHttpClient {
    config: SchwabClientConfig,
    http: Client,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl std::fmt::Debug for SchwabHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabHttpClient")
            .field("base_url", &self.config.base_url)
            .field("requests_per_minute", &self.config.requests_per_minute)
            .finish_non_exhaustive()
    }
}

impl SchwabHttpClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: SchwabClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SchwabError::Network(format!("failed to build HTTP client: {e}")))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
            config.requests_per_minute,
        )));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Validates a path segment (symbol, hash, order id) against path traversal.
    fn validate_segment(segment: &str) -> Result<&str> {
        if segment.contains("..") || segment.contains('/') || segment.contains('\\') {
            return Err(SchwabError::InvalidIdentifier(format!(
                "contains forbidden characters: {segment}"
            )));
        }

        if segment.is_empty() {
            return Err(SchwabError::InvalidIdentifier(
                "identifier cannot be empty".to_string(),
            ));
        }

        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(SchwabError::InvalidIdentifier(format!(
                "must contain only alphanumeric, hyphen, underscore, or dot: {segment}"
            )));
        }

        if segment.len() > 128 {
            return Err(SchwabError::InvalidIdentifier(format!(
                "exceeds maximum length of 128: {}",
                segment.len()
            )));
        }

        Ok(segment)
    }

    /// Waits for the rate limiter and sends an authenticated request.
    async fn send(&self, request: RequestBuilder, token: &AccessToken) -> Result<Response> {
        self.rate_limiter.until_ready().await;
        let response = request
            .bearer_auth(token.expose())
            .header("Accept", "application/json")
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Maps 429 and other non-success statuses to errors.
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(SchwabError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SchwabError::api(status.as_u16(), text));
        }

        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SchwabTransport for SchwabHttpClient {
    async fn account_numbers(&self, token: &AccessToken) -> Result<Vec<AccountRecord>> {
        let url = self.url("/trader/v1/accounts/accountNumbers");
        tracing::debug!("GET {}", url);
        let response = self.send(self.http.get(&url), token).await?;
        Ok(response.json().await?)
    }

    async fn quote(&self, token: &AccessToken, symbol: &str) -> Result<Value> {
        let symbol = Self::validate_segment(symbol)?;
        let url = self.url(&format!("/marketdata/v1/{symbol}/quotes"));
        tracing::debug!("GET {}", url);
        let response = self.send(self.http.get(&url), token).await?;
        Ok(response.json().await?)
    }

    async fn place_order(
        &self,
        token: &AccessToken,
        account_hash: &str,
        order: &OrderSpec,
    ) -> Result<PlacementResponse> {
        let account_hash = Self::validate_segment(account_hash)?;
        let url = self.url(&format!("/trader/v1/accounts/{account_hash}/orders"));
        tracing::debug!("POST {}", url);
        let response = self.send(self.http.post(&url).json(order), token).await?;

        Ok(PlacementResponse {
            status: response.status().as_u16(),
            location: response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }

    async fn order_status(
        &self,
        token: &AccessToken,
        account_hash: &str,
        order_id: &str,
    ) -> Result<OrderSnapshot> {
        let account_hash = Self::validate_segment(account_hash)?;
        let order_id = Self::validate_segment(order_id)?;
        let url = self.url(&format!("/trader/v1/accounts/{account_hash}/orders/{order_id}"));
        tracing::debug!("GET {}", url);
        let response = self.send(self.http.get(&url), token).await?;
        Ok(response.json().await?)
    }

    async fn cancel_order(&self, token: &AccessToken, account_hash: &str, order_id: &str) -> Result<()> {
        let account_hash = Self::validate_segment(account_hash)?;
        let order_id = Self::validate_segment(order_id)?;
        let url = self.url(&format!("/trader/v1/accounts/{account_hash}/orders/{order_id}"));
        tracing::debug!("DELETE {}", url);
        self.send(self.http.delete(&url), token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_trade_core::{Action, OrderKind};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SchwabHttpClient {
        SchwabHttpClient::new(SchwabClientConfig::default().with_base_url(server.uri())).unwrap()
    }

    fn token() -> AccessToken {
        AccessToken::new("test-token")
    }

    // ==================== Config Tests ====================

    #[test]
    fn test_client_config_default() {
        let config = SchwabClientConfig::default();
        assert_eq!(config.base_url, SCHWAB_API_URL);
        assert_eq!(config.requests_per_minute.get(), 120);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_client_config_builder() {
        let config = SchwabClientConfig::default()
            .with_base_url("http://localhost:9000")
            .with_rate_limit(nonzero!(10u32))
            .with_timeout_secs(5);

        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.requests_per_minute.get(), 10);
        assert_eq!(config.timeout_secs, 5);
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_segment() {
        assert!(SchwabHttpClient::validate_segment("BRK.B").is_ok());
        assert!(SchwabHttpClient::validate_segment("A1B2C3-hash_value").is_ok());
        assert!(SchwabHttpClient::validate_segment("../accounts").is_err());
        assert!(SchwabHttpClient::validate_segment("a/b").is_err());
        assert!(SchwabHttpClient::validate_segment("").is_err());
        assert!(SchwabHttpClient::validate_segment("a b").is_err());
        assert!(SchwabHttpClient::validate_segment(&"x".repeat(129)).is_err());
    }

    // ==================== Endpoint Tests ====================

    #[tokio::test]
    async fn test_account_numbers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trader/v1/accounts/accountNumbers"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"accountNumber": "12345678", "hashValue": "abc-1"},
                {"accountNumber": 87654321, "hashValue": "def-2"}
            ])))
            .mount(&server)
            .await;

        let accounts = client(&server).account_numbers(&token()).await.unwrap();

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[1].account_number, "87654321");
        assert_eq!(accounts[1].hash, "def-2");
    }

    #[tokio::test]
    async fn test_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/marketdata/v1/AAPL/quotes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "AAPL": {"quote": {"lastPrice": 201.25}}
            })))
            .mount(&server)
            .await;

        let quote = client(&server).quote(&token(), "AAPL").await.unwrap();

        assert_eq!(crate::transport::last_price(&quote, "AAPL").unwrap(), dec!(201.25));
    }

    #[tokio::test]
    async fn test_place_order_reads_location() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trader/v1/accounts/abc-1/orders"))
            .and(body_partial_json(serde_json::json!({"orderType": "LIMIT", "price": "10.50"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", "https://api.schwabapi.com/trader/v1/accounts/abc-1/orders/9001"),
            )
            .mount(&server)
            .await;

        let order = OrderSpec::equity(Action::Buy, OrderKind::Limit, "F", 2, Some(dec!(10.5)), false).unwrap();
        let response = client(&server).place_order(&token(), "abc-1", &order).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.order_id().as_deref(), Some("9001"));
    }

    #[tokio::test]
    async fn test_order_status_and_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trader/v1/accounts/abc-1/orders/9001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "WORKING", "orderId": 9001
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/trader/v1/accounts/abc-1/orders/9001"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let snapshot = client.order_status(&token(), "abc-1", "9001").await.unwrap();
        client.cancel_order(&token(), "abc-1", "9001").await.unwrap();

        assert_eq!(snapshot.status, "WORKING");
    }

    // ==================== Error Mapping Tests ====================

    #[tokio::test]
    async fn test_unauthorized_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/marketdata/v1/AAPL/quotes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = client(&server).quote(&token(), "AAPL").await.unwrap_err();

        assert!(matches!(err, SchwabError::Api { status_code: 401, .. }));
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trader/v1/accounts/accountNumbers"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let err = client(&server).account_numbers(&token()).await.unwrap_err();

        assert!(matches!(err, SchwabError::RateLimit { retry_after_secs: 12 }));
        assert!(!err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_traversal_never_sent() {
        let server = MockServer::start().await;
        let err = client(&server).quote(&token(), "../../etc").await.unwrap_err();
        assert!(matches!(err, SchwabError::InvalidIdentifier(_)));
    }
}
