//! Schwab OAuth token endpoint.
//!
//! Implements [`TokenProvider`] with the manual authorization-code flow:
//! the user opens the authorize URL, signs in, and pastes the URL they were
//! redirected to. Refreshes use the stored refresh token.

use crate::auth::{AccessToken, TokenProvider, EXPIRY_MARGIN_SECS};
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::{Result, SchwabError};
use async_trait::async_trait;
use batch_trade_core::SchwabConfig;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Credentials of the registered Schwab app.
#[derive(Clone)]
pub struct SchwabOAuthConfig {
    pub app_key: String,
    pub app_secret: SecretString,
    pub redirect_uri: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SchwabOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabOAuthConfig")
            .field("app_key", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl From<&SchwabConfig> for SchwabOAuthConfig {
    fn from(config: &SchwabConfig) -> Self {
        Self {
            app_key: config.app_key.clone(),
            app_secret: SecretString::from(config.app_secret.clone()),
            redirect_uri: config.redirect_uri.clone(),
            base_url: config.api_base_url.clone(),
            timeout_secs: 30,
        }
    }
}

/// OAuth client for the Schwab token endpoint.
pub struct SchwabOAuth {
    config: SchwabOAuthConfig,
    http: Client,
}

impl std::fmt::Debug for SchwabOAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabOAuth")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SchwabOAuth {
    /// Creates the client.
    ///
    /// # Errors
    /// Returns [`SchwabError::Configuration`] if the app key or secret is
    /// empty, or a network error if the HTTP client cannot be built.
    pub fn new(config: SchwabOAuthConfig) -> Result<Self> {
        if config.app_key.trim().is_empty() || config.app_secret.expose_secret().trim().is_empty() {
            return Err(SchwabError::Configuration(
                "Schwab app_key and app_secret must be set".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SchwabError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// URL the user opens to grant access.
    ///
    /// # Errors
    /// Returns [`SchwabError::Configuration`] if the base URL is malformed.
    pub fn authorize_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint("/v1/oauth/authorize"),
            &[
                ("client_id", self.config.app_key.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ],
        )
        .map_err(|e| SchwabError::Configuration(format!("invalid OAuth base URL: {e}")))
    }

    /// Exchanges the code in `redirected_url` and writes a fresh record.
    ///
    /// # Errors
    /// Returns [`SchwabError::AuthenticationFailed`] if the URL carries no
    /// code, or the token endpoint's error.
    pub async fn complete_authorization(
        &self,
        store: &CredentialStore,
        redirected_url: &str,
    ) -> Result<AccessToken> {
        let code = authorization_code(redirected_url)?;
        let token = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;

        let record = CredentialRecord::issued(token, Utc::now());
        let access = access_token_of(&record, store)?;
        store.write(&record)?;
        tracing::info!(path = %store.path().display(), "wrote new Schwab credentials");
        Ok(access)
    }

    async fn exchange_refresh_token(&self, store: &CredentialStore, record: CredentialRecord) -> Result<AccessToken> {
        let refresh_token = record
            .refresh_token()
            .ok_or_else(|| SchwabError::invalid_credentials(store.path(), "missing refresh_token"))?
            .to_string();

        let token = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await?;

        let record = record.with_refreshed_token(token);
        let access = access_token_of(&record, store)?;
        store.write(&record)?;
        tracing::debug!(path = %store.path().display(), "refreshed Schwab access token");
        Ok(access)
    }

    /// POSTs to the token endpoint and stamps `expires_at` on the result.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .http
            .post(self.endpoint("/v1/oauth/token"))
            .basic_auth(&self.config.app_key, Some(self.config.app_secret.expose_secret()))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SchwabError::api(status.as_u16(), text));
        }

        let token: Value = response.json().await?;
        Ok(stamp_expiry(token, Utc::now()))
    }
}

#[async_trait]
impl TokenProvider for SchwabOAuth {
    async fn load(&self, store: &CredentialStore) -> Result<AccessToken> {
        let record = store.load()?;
        let lapsed = record
            .access_expires_at()
            .map_or(true, |at| at <= Utc::now().timestamp() + EXPIRY_MARGIN_SECS);

        if lapsed {
            tracing::debug!("stored access token has lapsed, exchanging refresh token");
            return self.exchange_refresh_token(store, record).await;
        }
        access_token_of(&record, store)
    }

    async fn refresh(&self, store: &CredentialStore) -> Result<AccessToken> {
        let record = store.load()?;
        self.exchange_refresh_token(store, record).await
    }

    async fn authorize(&self, store: &CredentialStore) -> Result<AccessToken> {
        let url = self.authorize_url()?;
        println!("\nOpen this URL in a browser and sign in to Schwab:\n\n  {url}\n");
        println!("After approving access, paste the full URL you were redirected to:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        self.complete_authorization(store, line.trim()).await
    }
}

/// Extracts the `code` query parameter from a redirect URL.
///
/// # Errors
/// Returns [`SchwabError::AuthenticationFailed`] for an empty or code-less URL.
pub fn authorization_code(redirected_url: &str) -> Result<String> {
    let redirected_url = redirected_url.trim();
    if redirected_url.is_empty() {
        return Err(SchwabError::AuthenticationFailed(
            "no redirect URL provided".to_string(),
        ));
    }

    let url = Url::parse(redirected_url)
        .map_err(|e| SchwabError::AuthenticationFailed(format!("invalid redirect URL: {e}")))?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            SchwabError::AuthenticationFailed("redirect URL has no authorization code".to_string())
        })
}

/// Adds `expires_at` (epoch seconds) from `expires_in` when present.
fn stamp_expiry(mut token: Value, now: DateTime<Utc>) -> Value {
    let expires_in = token.get("expires_in").and_then(Value::as_i64);
    if let (Some(secs), Value::Object(map)) = (expires_in, &mut token) {
        map.insert("expires_at".to_string(), Value::from(now.timestamp() + secs));
    }
    token
}

fn access_token_of(record: &CredentialRecord, store: &CredentialStore) -> Result<AccessToken> {
    let token = record
        .access_token()
        .map(AccessToken::new)
        .ok_or_else(|| SchwabError::invalid_credentials(store.path(), "missing access_token"))?;
    Ok(match record.access_expires_at().and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        Some(at) => token.with_expires_at(at),
        None => token,
    })
}
