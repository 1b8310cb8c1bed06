//! Persisted OAuth credentials.
//!
//! The record keeps the layout used by common Schwab tooling:
//!
//! ```json
//! { "creation_timestamp": 1718000000, "token": { "access_token": "...", "refresh_token": "...", "expires_at": 1718001800 } }
//! ```
//!
//! `creation_timestamp` marks when the refresh token was issued and anchors
//! the seven-day expiry. The token object is carried as an opaque blob;
//! only the provider reads fields out of it.

use crate::error::{Result, SchwabError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Infix of superseded credential files: `<name>.backup_<unixtime>`.
pub const BACKUP_INFIX: &str = ".backup_";

// =============================================================================
// Credential Record
// =============================================================================

/// A persisted credential record.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Seconds since the epoch when the refresh token was issued.
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_timestamp: Option<i64>,

    /// OAuth token material.
    #[serde(default)]
    pub token: Value,

    /// Any other top-level fields, preserved on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("creation_timestamp", &self.creation_timestamp)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Accepts integer or float seconds; anything else fails the whole record.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))))
}

impl CredentialRecord {
    /// A fresh record for a newly issued token.
    #[must_use]
    pub fn issued(token: Value, now: DateTime<Utc>) -> Self {
        Self {
            creation_timestamp: Some(now.timestamp()),
            token,
            extra: Map::new(),
        }
    }

    /// Replaces the token material, keeping the original issue time.
    ///
    /// Fields missing from `token` (typically `refresh_token`) are kept
    /// from the previous material.
    #[must_use]
    pub fn with_refreshed_token(mut self, token: Value) -> Self {
        match (&mut self.token, token) {
            (Value::Object(current), Value::Object(fresh)) => {
                for (key, value) in fresh {
                    current.insert(key, value);
                }
            }
            (current, fresh) => *current = fresh,
        }
        self
    }

    /// When the refresh token was issued, if recorded.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.token.get("access_token").and_then(Value::as_str)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.token.get("refresh_token").and_then(Value::as_str)
    }

    /// Access token expiry in epoch seconds.
    #[must_use]
    pub fn access_expires_at(&self) -> Option<i64> {
        self.token.get("expires_at").and_then(|v| {
            v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
        })
    }
}

// =============================================================================
// Credential Store
// =============================================================================

/// What was found at the credential path.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialFile {
    /// No file exists.
    Missing,
    /// A file exists but could not be read or parsed.
    Unreadable(String),
    /// A parsed record.
    Present(CredentialRecord),
}

/// File-backed credential storage.
///
/// One store should own a path at a time: two processes that both back up
/// and rewrite the same file would race.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the credential file without failing.
    #[must_use]
    pub fn read(&self) -> CredentialFile {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return CredentialFile::Missing,
            Err(e) => return CredentialFile::Unreadable(e.to_string()),
        };

        match serde_json::from_reader::<_, CredentialRecord>(BufReader::new(file)) {
            Ok(record) => CredentialFile::Present(record),
            Err(e) => CredentialFile::Unreadable(e.to_string()),
        }
    }

    /// Reads the record, treating anything but a parsed record as an error.
    ///
    /// # Errors
    /// Returns [`SchwabError::InvalidCredentialFile`] if the file is missing or unparseable.
    pub fn load(&self) -> Result<CredentialRecord> {
        match self.read() {
            CredentialFile::Present(record) => Ok(record),
            CredentialFile::Missing => Err(SchwabError::invalid_credentials(
                &self.path,
                "file not found",
            )),
            CredentialFile::Unreadable(reason) => {
                Err(SchwabError::invalid_credentials(&self.path, reason))
            }
        }
    }

    /// Writes `record`, replacing any existing file.
    ///
    /// The record is written to a sibling temp file first and renamed into
    /// place so a crash never leaves a truncated record.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn write(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.sibling(".tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, record)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), "credential record written");
        Ok(())
    }

    /// Renames the current file aside as `<name>.backup_<unixtime>`.
    ///
    /// Returns the backup path, or `None` if there was no file. An existing
    /// backup is never overwritten; the timestamp is bumped instead.
    ///
    /// # Errors
    /// Returns error if the rename fails.
    pub fn backup_aside(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut stamp = now.timestamp();
        let mut backup = self.sibling(&format!("{BACKUP_INFIX}{stamp}"));
        while backup.exists() {
            stamp += 1;
            backup = self.sibling(&format!("{BACKUP_INFIX}{stamp}"));
        }

        std::fs::rename(&self.path, &backup)?;
        tracing::info!(backup = %backup.display(), "backed up old credential file");
        Ok(Some(backup))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("schwab_tokens.json"))
    }

    fn backups_in(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(BACKUP_INFIX))
            .collect()
    }

    // ==================== Record Tests ====================

    #[test]
    fn test_record_parses_common_layout() {
        let record: CredentialRecord = serde_json::from_value(json!({
            "creation_timestamp": 1_700_000_000,
            "token": {"access_token": "a", "refresh_token": "r", "expires_at": 1_700_001_800}
        }))
        .unwrap();

        assert_eq!(record.creation_timestamp, Some(1_700_000_000));
        assert_eq!(record.access_token(), Some("a"));
        assert_eq!(record.refresh_token(), Some("r"));
        assert_eq!(record.access_expires_at(), Some(1_700_001_800));
    }

    #[test]
    fn test_float_timestamp_accepted() {
        let record: CredentialRecord =
            serde_json::from_value(json!({"creation_timestamp": 1_700_000_000.75, "token": {}}))
                .unwrap();
        assert_eq!(record.creation_timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_missing_timestamp_is_none() {
        let record: CredentialRecord =
            serde_json::from_value(json!({"token": {"access_token": "a"}})).unwrap();
        assert!(record.creation_timestamp.is_none());
        assert!(record.created_at().is_none());
    }

    #[test]
    fn test_refresh_keeps_creation_time_and_refresh_token() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = CredentialRecord::issued(json!({"access_token": "old", "refresh_token": "r"}), now)
            .with_refreshed_token(json!({"access_token": "new", "expires_at": 5}));

        assert_eq!(record.creation_timestamp, Some(1_700_000_000));
        assert_eq!(record.access_token(), Some("new"));
        assert_eq!(record.refresh_token(), Some("r"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let record = CredentialRecord::issued(json!({"access_token": "secret-value"}), Utc::now());
        assert!(!format!("{record:?}").contains("secret-value"));
    }

    // ==================== Store Tests ====================

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).read(), CredentialFile::Missing);
    }

    #[test]
    fn test_read_garbage_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json at all").unwrap();
        assert!(matches!(store.read(), CredentialFile::Unreadable(_)));
        assert!(matches!(
            store.load(),
            Err(SchwabError::InvalidCredentialFile { .. })
        ));
    }

    #[test]
    fn test_string_timestamp_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"creation_timestamp": "yesterday", "token": {}}"#).unwrap();
        assert!(matches!(store.read(), CredentialFile::Unreadable(_)));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("nested/tokens.json"));
        let record = CredentialRecord::issued(json!({"access_token": "a"}), Utc::now());

        store.write(&record).unwrap();

        assert_eq!(store.read(), CredentialFile::Present(record));
        assert!(!dir.path().join("nested/tokens.json.tmp").exists());
    }

    #[test]
    fn test_extra_fields_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"creation_timestamp": 1, "token": {}, "metadata": {"v": 2}}"#,
        )
        .unwrap();

        let record = store.load().unwrap();
        store.write(&record).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["v"], 2);
    }

    // ==================== Backup Tests ====================

    #[test]
    fn test_backup_without_file_is_noop() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).backup_aside(Utc::now()).unwrap().is_none());
        assert!(backups_in(&dir).is_empty());
    }

    #[test]
    fn test_backup_renames_with_unix_suffix() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{}").unwrap();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let backup = store.backup_aside(now).unwrap().unwrap();

        assert_eq!(
            backup.file_name().unwrap().to_string_lossy(),
            "schwab_tokens.json.backup_1700000000"
        );
        assert!(!store.exists());
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{}");
    }

    #[test]
    fn test_backup_never_overwrites_previous_backup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        std::fs::write(store.path(), "first").unwrap();
        store.backup_aside(now).unwrap();
        std::fs::write(store.path(), "second").unwrap();
        let second = store.backup_aside(now).unwrap().unwrap();

        assert_eq!(backups_in(&dir).len(), 2);
        assert!(second.to_string_lossy().ends_with(".backup_1700000001"));
    }
}
