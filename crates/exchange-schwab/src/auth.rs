//! OAuth credential lifecycle.
//!
//! [`AuthOrchestrator`] decides, from the age of the stored credentials,
//! whether to load them, refresh them proactively, or run the full OAuth
//! flow. It also intercepts failures from API calls and re-authenticates
//! once when the failure looks like an auth problem.
//!
//! The network side lives behind [`TokenProvider`] so the decision logic
//! can be driven by fakes in tests.
//!
//! # Example
//!
//! ```ignore
//! use batch_trade_schwab::{AuthConfig, AuthOrchestrator, SchwabOAuth};
//!
//! let provider = SchwabOAuth::new(oauth_config)?;
//! let mut auth = AuthOrchestrator::new(AuthConfig::default(), provider);
//! auth.initialize().await?;
//! let token = auth.access_token().await?;
//! ```
//!
//! # Concurrency
//!
//! An orchestrator owns its credential file. Every mutating call takes
//! `&mut self`, so sharing one across tasks requires an external lock
//! (e.g. `tokio::sync::Mutex`); two orchestrators must not point at the
//! same file.

use crate::credentials::{CredentialFile, CredentialStore};
use crate::error::{Result, SchwabError};
use crate::token_health::{classify_file, TokenHealth, TokenStatus, DEFAULT_REFRESH_THRESHOLD_DAYS, HARD_EXPIRY_DAYS};
use async_trait::async_trait;
use batch_trade_core::SchwabConfig;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for one orchestrator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    /// Credential file location.
    pub token_path: PathBuf,

    /// Whether near-expiry credentials are refreshed before use.
    pub enable_proactive_refresh: bool,

    /// Age in days at which credentials count as near expiry.
    pub refresh_threshold_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("./schwab_tokens.json"),
            enable_proactive_refresh: true,
            refresh_threshold_days: DEFAULT_REFRESH_THRESHOLD_DAYS,
        }
    }
}

impl AuthConfig {
    /// Sets the credential file location.
    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Enables or disables proactive refresh.
    #[must_use]
    pub fn with_proactive_refresh(mut self, enabled: bool) -> Self {
        self.enable_proactive_refresh = enabled;
        self
    }

    /// Sets the near-expiry threshold.
    #[must_use]
    pub fn with_refresh_threshold_days(mut self, days: u32) -> Self {
        self.refresh_threshold_days = days;
        self
    }
}

impl From<&SchwabConfig> for AuthConfig {
    fn from(config: &SchwabConfig) -> Self {
        Self {
            token_path: config.token_path.clone(),
            enable_proactive_refresh: config.enable_proactive_refresh,
            refresh_threshold_days: config.refresh_threshold_days,
        }
    }
}

// =============================================================================
// Token Provider
// =============================================================================

/// Access tokens this close to expiry are renewed before use.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Bearer token for API calls.
#[derive(Clone)]
pub struct AccessToken {
    secret: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// A token with no known expiry.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(token.into()),
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True once `now` is within [`EXPIRY_MARGIN_SECS`] of the expiry.
    /// Tokens without an expiry never lapse.
    #[must_use]
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + Duration::seconds(EXPIRY_MARGIN_SECS))
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The OAuth operations the orchestrator sequences.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Loads stored credentials, exchanging the refresh token if the
    /// access token has lapsed.
    async fn load(&self, store: &CredentialStore) -> Result<AccessToken>;

    /// Exchanges the stored refresh token for a new access token.
    async fn refresh(&self, store: &CredentialStore) -> Result<AccessToken>;

    /// Runs the full OAuth flow and writes a fresh record.
    async fn authorize(&self, store: &CredentialStore) -> Result<AccessToken>;
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoRecord,
    Loading,
    NearExpiryLoading,
    Authenticating,
    Ready,
    Failed,
}

/// Outcome of the first attempt of an API call under [`AuthOrchestrator::intercept`].
#[derive(Debug)]
pub enum Attempt<T> {
    /// The call succeeded.
    Done(T),
    /// Credentials were renewed; the call should be made once more.
    Retry,
}

/// Owns the credential lifecycle for one credential file.
pub struct AuthOrchestrator<P> {
    config: AuthConfig,
    store: CredentialStore,
    provider: P,
    state: AuthState,
    token: Option<AccessToken>,
}

impl<P> std::fmt::Debug for AuthOrchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: TokenProvider> AuthOrchestrator<P> {
    /// Creates an orchestrator. Nothing is read until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(config: AuthConfig, provider: P) -> Self {
        if f64::from(config.refresh_threshold_days) >= HARD_EXPIRY_DAYS {
            tracing::warn!(
                refresh_threshold_days = config.refresh_threshold_days,
                "refresh threshold is not below the 7-day expiry; proactive refresh will never trigger"
            );
        }
        let store = CredentialStore::new(config.token_path.clone());
        Self {
            config,
            store,
            provider,
            state: AuthState::NoRecord,
            token: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The current access token.
    ///
    /// # Errors
    /// Returns [`SchwabError::NotAuthenticated`] unless the orchestrator is ready.
    pub fn token(&self) -> Result<&AccessToken> {
        match (&self.token, self.state) {
            (Some(token), AuthState::Ready) => Ok(token),
            _ => Err(SchwabError::NotAuthenticated(format!(
                "credentials not ready (state {:?})",
                self.state
            ))),
        }
    }

    /// The access token to send with the next API call.
    ///
    /// A lapsed token is renewed through [`TokenProvider::load`], which
    /// exchanges the stored refresh token. The credential file is left in
    /// place either way.
    ///
    /// # Errors
    /// Returns [`SchwabError::NotAuthenticated`] if the orchestrator is not
    /// ready or the renewal is rejected; network failures come back unchanged.
    pub async fn access_token(&mut self) -> Result<AccessToken> {
        if !self.token()?.is_lapsed(Utc::now()) {
            return self.token().cloned();
        }

        tracing::info!("access token has lapsed, renewing from stored refresh token");
        match self.provider.load(&self.store).await {
            Ok(token) => {
                self.set_ready(token);
                tracing::info!("access token renewed");
                self.token().cloned()
            }
            Err(e @ (SchwabError::Network(_) | SchwabError::Timeout(_) | SchwabError::RateLimit { .. })) => {
                tracing::warn!(error = %e, "access token renewal could not reach Schwab");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "access token renewal failed");
                Err(SchwabError::NotAuthenticated(format!(
                    "access token renewal failed: {e}"
                )))
            }
        }
    }

    /// Classifies the stored credentials as of now.
    #[must_use]
    pub fn evaluate(&self) -> TokenHealth {
        classify_file(&self.store.read(), Utc::now(), self.config.refresh_threshold_days)
    }

    /// Status report for the stored credentials. Does not change state.
    #[must_use]
    pub fn token_status(&self) -> TokenStatus {
        TokenStatus::evaluate(&self.store.read(), Utc::now(), self.config.refresh_threshold_days)
    }

    /// Brings the orchestrator to `Ready`.
    ///
    /// | health                      | action                                   |
    /// |-----------------------------|------------------------------------------|
    /// | absent / invalid / expired  | full authentication                      |
    /// | valid                       | load, falling back to full auth          |
    /// | near expiry                 | load, then refresh if enabled; any failure falls back to full auth |
    ///
    /// # Errors
    /// Returns [`SchwabError::AuthenticationFailed`] if full authentication fails.
    pub async fn initialize(&mut self) -> Result<()> {
        let file = self.store.read();
        if let CredentialFile::Unreadable(reason) = &file {
            tracing::warn!(path = %self.store.path().display(), %reason, "error reading credential file");
        }

        let health = classify_file(&file, Utc::now(), self.config.refresh_threshold_days);
        tracing::info!(
            path = %self.store.path().display(),
            health = %health,
            "evaluated stored Schwab credentials"
        );

        match health {
            TokenHealth::Absent => {
                tracing::info!("no credential file found, starting first-time authentication");
                self.full_authenticate().await
            }
            TokenHealth::Invalid => {
                tracing::warn!("credential file is corrupted or invalid, re-authenticating");
                self.full_authenticate().await
            }
            TokenHealth::Expired => {
                tracing::warn!("refresh token has expired (7+ days old), re-authenticating");
                self.full_authenticate().await
            }
            TokenHealth::Valid => {
                self.state = AuthState::Loading;
                match self.provider.load(&self.store).await {
                    Ok(token) => {
                        tracing::info!("loaded existing credentials");
                        self.set_ready(token);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to load credentials, re-authenticating");
                        self.full_authenticate().await
                    }
                }
            }
            TokenHealth::NearExpiry => {
                self.state = AuthState::NearExpiryLoading;
                match self.provider.load(&self.store).await {
                    Ok(token) => {
                        tracing::info!("loaded near-expiry credentials");
                        self.set_ready(token);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to load near-expiry credentials, re-authenticating");
                        return self.full_authenticate().await;
                    }
                }

                if self.config.enable_proactive_refresh {
                    if let Err(e) = self.try_refresh().await {
                        tracing::warn!(error = %e, "proactive refresh failed, re-authenticating");
                        return self.full_authenticate().await;
                    }
                }
                Ok(())
            }
        }
    }

    /// Lightweight refresh through the provider.
    ///
    /// On failure the current state and token are left untouched; the
    /// caller decides whether to fall back to [`full_authenticate`](Self::full_authenticate).
    ///
    /// # Errors
    /// Returns the provider's error.
    pub async fn try_refresh(&mut self) -> Result<()> {
        tracing::info!("performing proactive token refresh");
        let token = self.provider.refresh(&self.store).await?;
        self.set_ready(token);
        tracing::info!("proactive token refresh completed");
        Ok(())
    }

    /// Backs up the current credential file and runs the full OAuth flow.
    ///
    /// # Errors
    /// Returns [`SchwabError::AuthenticationFailed`]; the orchestrator is
    /// then `Failed` and holds no token.
    pub async fn full_authenticate(&mut self) -> Result<()> {
        tracing::info!("starting full OAuth authentication flow");
        self.state = AuthState::Authenticating;
        self.token = None;

        if let Err(e) = self.store.backup_aside(Utc::now()) {
            self.state = AuthState::Failed;
            return Err(SchwabError::AuthenticationFailed(format!(
                "could not back up credential file: {e}"
            )));
        }

        match self.provider.authorize(&self.store).await {
            Ok(token) => {
                self.set_ready(token);
                tracing::info!("full authentication completed successfully");
                Ok(())
            }
            Err(e) => {
                self.state = AuthState::Failed;
                tracing::error!(error = %e, "full authentication failed");
                match e {
                    SchwabError::AuthenticationFailed(_) => Err(e),
                    other => Err(SchwabError::AuthenticationFailed(other.to_string())),
                }
            }
        }
    }

    /// Re-authenticates after an auth-related failure of `operation`.
    ///
    /// Returns `Ok(())` when the caller should retry. Errors that are not
    /// auth-related come back unchanged.
    ///
    /// # Errors
    /// Returns the original error if it is not auth-related, or
    /// [`SchwabError::AuthRecoveryFailed`] if re-authentication fails.
    pub async fn handle_auth_error(&mut self, error: SchwabError, operation: &str) -> Result<()> {
        if !error.is_auth_failure() {
            return Err(error);
        }

        tracing::warn!(%operation, error = %error, "authentication error, attempting re-authentication");
        match self.full_authenticate().await {
            Ok(()) => {
                tracing::info!(%operation, "re-authentication successful");
                Ok(())
            }
            Err(reauth) => {
                tracing::error!(%operation, error = %reauth, "re-authentication failed");
                Err(SchwabError::AuthRecoveryFailed {
                    operation: operation.to_string(),
                    source: Box::new(reauth),
                })
            }
        }
    }

    /// Settles the first attempt of `operation`.
    ///
    /// # Errors
    /// See [`handle_auth_error`](Self::handle_auth_error).
    pub async fn intercept<T>(&mut self, attempt: Result<T>, operation: &str) -> Result<Attempt<T>> {
        match attempt {
            Ok(value) => Ok(Attempt::Done(value)),
            Err(e) => {
                self.handle_auth_error(e, operation).await?;
                Ok(Attempt::Retry)
            }
        }
    }

    fn set_ready(&mut self, token: AccessToken) {
        self.token = Some(token);
        self.state = AuthState::Ready;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;
    use crate::credentials::{CredentialRecord, BACKUP_INFIX};
    use chrono::Duration;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AuthConfig {
        AuthConfig::default().with_token_path(dir.path().join("tokens.json"))
    }

    fn write_aged(dir: &TempDir, days: i64) {
        let record = CredentialRecord::issued(
            serde_json::json!({"access_token": "a", "refresh_token": "r"}),
            Utc::now() - Duration::days(days),
        );
        CredentialStore::new(dir.path().join("tokens.json"))
            .write(&record)
            .unwrap();
    }

    fn backup_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(BACKUP_INFIX))
            .count()
    }

    // ==================== Initialization Tests ====================

    #[tokio::test]
    async fn test_absent_record_authenticates() {
        let dir = TempDir::new().unwrap();
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        assert_eq!(auth.state(), AuthState::NoRecord);
        auth.initialize().await.unwrap();

        assert_eq!(auth.state(), AuthState::Ready);
        assert_eq!(provider.counts(), (0, 0, 1));
        assert_eq!(backup_count(&dir), 0);
        assert_eq!(auth.token().unwrap().expose(), "fresh-0");
    }

    #[tokio::test]
    async fn test_valid_record_is_loaded() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 3);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (1, 0, 0));
        assert_eq!(auth.token().unwrap().expose(), "loaded");
    }

    #[tokio::test]
    async fn test_valid_record_load_failure_falls_back() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider {
            fail_load: true,
            ..Default::default()
        };
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (1, 0, 1));
        assert_eq!(backup_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_expired_record_skips_load() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 8);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (0, 0, 1));
        assert_eq!(backup_count(&dir), 1);
        assert!(auth.store().exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_authenticates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tokens.json"), "{{{").unwrap();
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        assert_eq!(auth.evaluate(), TokenHealth::Invalid);
        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (0, 0, 1));
        assert_eq!(backup_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_near_expiry_refreshes_proactively() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 6);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (1, 1, 0));
        assert_eq!(auth.token().unwrap().expose(), "refreshed");
    }

    #[tokio::test]
    async fn test_near_expiry_without_proactive_refresh() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 6);
        let provider = FakeProvider::default();
        let mut auth =
            AuthOrchestrator::new(config_in(&dir).with_proactive_refresh(false), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (1, 0, 0));
        assert_eq!(auth.token().unwrap().expose(), "loaded");
    }

    #[tokio::test]
    async fn test_near_expiry_refresh_failure_escalates() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 6);
        let provider = FakeProvider {
            fail_refresh: true,
            ..Default::default()
        };
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (1, 1, 1));
        assert_eq!(auth.token().unwrap().expose(), "fresh-0");
        assert_eq!(backup_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_near_expiry_load_failure_escalates() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 6);
        let provider = FakeProvider {
            fail_load: true,
            ..Default::default()
        };
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        auth.initialize().await.unwrap();

        assert_eq!(provider.counts(), (1, 0, 1));
        assert_eq!(backup_count(&dir), 1);
        assert_eq!(auth.token().unwrap().expose(), "fresh-0");
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let provider = FakeProvider {
            fail_authorize: true,
            ..Default::default()
        };
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        let err = auth.initialize().await.unwrap_err();

        assert!(matches!(err, SchwabError::AuthenticationFailed(_)));
        assert_eq!(err.to_string(), "authentication failed: no redirect URL provided");
        assert_eq!(auth.state(), AuthState::Failed);
        assert!(auth.token().is_err());
        assert_eq!(provider.counts(), (0, 0, 1));
    }

    // ==================== Explicit Refresh Tests ====================

    #[tokio::test]
    async fn test_try_refresh_failure_leaves_token() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider {
            fail_refresh: true,
            ..Default::default()
        };
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider);
        auth.initialize().await.unwrap();

        assert!(auth.try_refresh().await.is_err());
        assert_eq!(auth.state(), AuthState::Ready);
        assert_eq!(auth.token().unwrap().expose(), "loaded");
    }

    // ==================== Access Token Renewal Tests ====================

    #[tokio::test]
    async fn test_unexpired_access_token_is_reused() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());
        auth.initialize().await.unwrap();
        auth.token = Some(AccessToken::new("current").with_expires_at(Utc::now() + Duration::minutes(20)));

        assert_eq!(auth.access_token().await.unwrap().expose(), "current");
        assert_eq!(provider.counts(), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_lapsed_access_token_is_renewed_in_place() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());
        auth.initialize().await.unwrap();
        auth.token = Some(AccessToken::new("stale").with_expires_at(Utc::now() - Duration::seconds(5)));

        let token = auth.access_token().await.unwrap();

        assert_eq!(token.expose(), "loaded");
        assert_eq!(auth.state(), AuthState::Ready);
        assert_eq!(provider.counts(), (2, 0, 0));
        assert_eq!(backup_count(&dir), 0);
        assert!(auth.store().exists());
    }

    #[test]
    fn test_token_inside_expiry_margin_counts_as_lapsed() {
        let now = Utc::now();
        let token = AccessToken::new("t").with_expires_at(now + Duration::seconds(EXPIRY_MARGIN_SECS - 1));
        assert!(token.is_lapsed(now));
        assert!(!AccessToken::new("t").is_lapsed(now));
    }

    #[tokio::test]
    async fn test_rejected_renewal_escalates_to_full_auth() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());
        auth.initialize().await.unwrap();
        auth.token = Some(AccessToken::new("stale").with_expires_at(Utc::now() - Duration::seconds(5)));
        auth.provider.fail_load = true;

        let renewal = auth.access_token().await;
        assert!(matches!(renewal, Err(SchwabError::NotAuthenticated(_))));

        let outcome = auth.intercept(renewal, "quote request").await.unwrap();
        assert!(matches!(outcome, Attempt::Retry));
        assert_eq!(provider.counts(), (2, 0, 1));
        assert_eq!(backup_count(&dir), 1);
        assert_eq!(auth.token().unwrap().expose(), "fresh-0");
    }

    // ==================== Runtime Recovery Tests ====================

    #[tokio::test]
    async fn test_auth_error_reauthenticates_once() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());
        auth.initialize().await.unwrap();

        auth.handle_auth_error(SchwabError::Transport("HTTP 401".to_string()), "quote request")
            .await
            .unwrap();

        assert_eq!(provider.counts(), (1, 0, 1));
        assert_eq!(backup_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_non_auth_error_propagates_unchanged() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider::default();
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider.clone());
        auth.initialize().await.unwrap();

        let err = auth
            .handle_auth_error(SchwabError::Transport("rate limit exceeded".to_string()), "quote request")
            .await
            .unwrap_err();

        assert!(matches!(err, SchwabError::Transport(ref m) if m == "rate limit exceeded"));
        assert_eq!(provider.counts(), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_failed_recovery_wraps_reauth_error() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 1);
        let provider = FakeProvider {
            fail_authorize: true,
            ..Default::default()
        };
        let mut auth = AuthOrchestrator::new(config_in(&dir), provider);
        auth.initialize().await.unwrap();

        let err = auth
            .handle_auth_error(SchwabError::api(401, "Unauthorized"), "order placement")
            .await
            .unwrap_err();

        match err {
            SchwabError::AuthRecoveryFailed { operation, source } => {
                assert_eq!(operation, "order placement");
                assert!(matches!(*source, SchwabError::AuthenticationFailed(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_intercept_passes_success_through() {
        let dir = TempDir::new().unwrap();
        let mut auth = AuthOrchestrator::new(config_in(&dir), FakeProvider::default());

        let outcome = auth.intercept(Ok(7), "noop").await.unwrap();
        assert!(matches!(outcome, Attempt::Done(7)));
    }

    // ==================== Status Tests ====================

    #[tokio::test]
    async fn test_status_does_not_mutate() {
        let dir = TempDir::new().unwrap();
        write_aged(&dir, 6);
        let provider = FakeProvider::default();
        let auth = AuthOrchestrator::new(config_in(&dir), provider.clone());

        let status = auth.token_status();

        assert_eq!(status.health, TokenHealth::NearExpiry);
        assert!(status.needs_refresh);
        assert_eq!(auth.state(), AuthState::NoRecord);
        assert_eq!(provider.counts(), (0, 0, 0));
    }

    #[test]
    fn test_config_from_schwab_settings() {
        let mut schwab = SchwabConfig::default();
        schwab.refresh_threshold_days = 3;
        schwab.enable_proactive_refresh = false;

        let config = AuthConfig::from(&schwab);

        assert_eq!(config.refresh_threshold_days, 3);
        assert!(!config.enable_proactive_refresh);
        assert_eq!(config.token_path, schwab.token_path);
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        assert!(!format!("{:?}", AccessToken::new("abc123")).contains("abc123"));
    }
}
