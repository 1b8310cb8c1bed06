//! Account identifier resolution.
//!
//! Orders must be placed against an account's opaque hash, but users know
//! their accounts by number or by display name. [`AccountIdentifierMap`]
//! maps every known form to the hash.

use crate::auth::{AuthOrchestrator, TokenProvider};
use crate::error::Result;
use crate::transport::SchwabTransport;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};

/// One linked account as returned by the account listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "accountNumber", deserialize_with = "string_or_number")]
    pub account_number: String,

    #[serde(rename = "displayId", default)]
    pub display_id: Option<String>,

    #[serde(rename = "hashValue")]
    pub hash: String,
}

impl AccountRecord {
    #[must_use]
    pub fn new(account_number: impl Into<String>, display_id: Option<&str>, hash: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            display_id: display_id.map(str::to_string),
            hash: hash.into(),
        }
    }
}

/// Account numbers arrive as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

// =============================================================================
// Identifier Map
// =============================================================================

/// Every known identifier, keyed to its canonical hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIdentifierMap {
    /// Keys in insertion order, for listing.
    keys: Vec<String>,
    by_key: HashMap<String, String>,
}

impl AccountIdentifierMap {
    /// Builds the map: number, display id (if any) and hash all map to the hash.
    #[must_use]
    pub fn from_accounts(accounts: &[AccountRecord]) -> Self {
        let mut map = Self::default();
        for account in accounts {
            let hash = account.hash.trim();
            if hash.is_empty() {
                tracing::warn!(account = %account.account_number, "skipping account without hash");
                continue;
            }
            map.insert(account.account_number.trim(), hash);
            if let Some(display) = account.display_id.as_deref().map(str::trim) {
                if !display.is_empty() {
                    map.insert(display, hash);
                }
            }
            map.insert(hash, hash);
        }
        map
    }

    fn insert(&mut self, key: &str, hash: &str) {
        if key.is_empty() {
            return;
        }
        if self.by_key.insert(key.to_string(), hash.to_string()).is_none() {
            self.keys.push(key.to_string());
        }
    }

    /// Exact match first, then a case-insensitive scan.
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> Option<&str> {
        let identifier = identifier.trim();
        if let Some(hash) = self.by_key.get(identifier) {
            return Some(hash);
        }
        let lower = identifier.to_lowercase();
        self.keys
            .iter()
            .find(|key| key.to_lowercase() == lower)
            .and_then(|key| self.by_key.get(key))
            .map(String::as_str)
    }

    /// All known identifiers in insertion order.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.keys
    }

    /// Aliases grouped by hash, excluding each hash's self-mapping.
    #[must_use]
    pub fn aliases_by_hash(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for key in &self.keys {
            if let Some(hash) = self.by_key.get(key) {
                let aliases = grouped.entry(hash.clone()).or_default();
                if key != hash {
                    aliases.push(key.clone());
                }
            }
        }
        for aliases in grouped.values_mut() {
            aliases.sort();
        }
        grouped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Lazily populated identifier cache.
#[derive(Debug, Default)]
pub struct AccountResolver {
    map: Option<AccountIdentifierMap>,
}

impl AccountResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.map.is_some()
    }

    /// Fetches the account listing unless already cached.
    ///
    /// A failed listing goes through [`AuthOrchestrator::handle_auth_error`]
    /// and is retried once; a second failure propagates.
    ///
    /// # Errors
    /// Returns the listing error, or the orchestrator's recovery error.
    pub async fn ensure_populated<T, P>(
        &mut self,
        transport: &T,
        auth: &mut AuthOrchestrator<P>,
        force_refresh: bool,
    ) -> Result<()>
    where
        T: SchwabTransport + ?Sized,
        P: TokenProvider,
    {
        if self.map.is_some() && !force_refresh {
            return Ok(());
        }

        let first = match auth.access_token().await {
            Ok(token) => transport.account_numbers(&token).await,
            Err(e) => Err(e),
        };
        let accounts = match first {
            Ok(accounts) => accounts,
            Err(e) => {
                auth.handle_auth_error(e, "account listing").await?;
                let token = auth.access_token().await?;
                transport.account_numbers(&token).await?
            }
        };

        let map = AccountIdentifierMap::from_accounts(&accounts);
        tracing::info!(
            accounts = accounts.len(),
            identifiers = map.len(),
            "populated Schwab account identifiers"
        );
        self.map = Some(map);
        Ok(())
    }

    /// Canonical hash for `identifier`, if known. Never populates.
    #[must_use]
    pub fn resolve(&self, identifier: &str) -> Option<String> {
        self.map
            .as_ref()
            .and_then(|m| m.resolve(identifier))
            .map(str::to_string)
    }

    /// The cached map, if populated.
    #[must_use]
    pub fn map(&self) -> Option<&AccountIdentifierMap> {
        self.map.as_ref()
    }
}
