//! Credential age policy.
//!
//! Schwab refresh tokens expire seven days after issue. Everything here is
//! a pure function of a record and "now".

use crate::credentials::{CredentialFile, CredentialRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Refresh tokens are dead at this age.
pub const HARD_EXPIRY_DAYS: f64 = 7.0;

/// Default age at which a proactive refresh is attempted.
pub const DEFAULT_REFRESH_THRESHOLD_DAYS: u32 = 5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Classification of the stored credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenHealth {
    Valid,
    NearExpiry,
    Expired,
    Invalid,
    Absent,
}

impl TokenHealth {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::NearExpiry => "near_expiry",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::Absent => "absent",
        }
    }

    /// States that can only be fixed by a full OAuth flow.
    #[must_use]
    pub fn requires_full_authentication(&self) -> bool {
        matches!(self, Self::Expired | Self::Invalid | Self::Absent)
    }
}

impl std::fmt::Display for TokenHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Days between `created` (epoch seconds) and `now`.
#[must_use]
pub fn age_days(created: i64, now: DateTime<Utc>) -> f64 {
    (now.timestamp_millis() as f64 / 1000.0 - created as f64) / SECONDS_PER_DAY
}

/// Classifies an age against the soft threshold and the hard expiry.
#[must_use]
pub fn classify_age(age_days: f64, refresh_threshold_days: f64) -> TokenHealth {
    if age_days >= HARD_EXPIRY_DAYS {
        TokenHealth::Expired
    } else if age_days >= refresh_threshold_days {
        TokenHealth::NearExpiry
    } else {
        TokenHealth::Valid
    }
}

/// Classifies a record. A missing record or timestamp is `Invalid`.
#[must_use]
pub fn classify(
    record: Option<&CredentialRecord>,
    now: DateTime<Utc>,
    refresh_threshold_days: u32,
) -> TokenHealth {
    match record.and_then(|r| r.creation_timestamp) {
        Some(created) => classify_age(age_days(created, now), f64::from(refresh_threshold_days)),
        None => TokenHealth::Invalid,
    }
}

/// Classifies what was found on disk; no file at all is `Absent`.
#[must_use]
pub fn classify_file(
    file: &CredentialFile,
    now: DateTime<Utc>,
    refresh_threshold_days: u32,
) -> TokenHealth {
    match file {
        CredentialFile::Missing => TokenHealth::Absent,
        CredentialFile::Unreadable(_) => TokenHealth::Invalid,
        CredentialFile::Present(record) => classify(Some(record), now, refresh_threshold_days),
    }
}

// =============================================================================
// Status Report
// =============================================================================

/// Human-readable credential status for operational tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStatus {
    pub health: TokenHealth,
    pub created: Option<DateTime<Utc>>,
    /// Age rounded to one decimal.
    pub age_days: Option<f64>,
    /// Days until the hard expiry, rounded to one decimal. Negative once expired.
    pub days_until_expiry: Option<f64>,
    /// True once the age reaches the refresh threshold.
    pub needs_refresh: bool,
    pub message: Option<String>,
    pub recommendation: String,
}

impl TokenStatus {
    /// Builds the report. Never fails; problems show up as `health`.
    #[must_use]
    pub fn evaluate(file: &CredentialFile, now: DateTime<Utc>, refresh_threshold_days: u32) -> Self {
        let health = classify_file(file, now, refresh_threshold_days);

        let created_ts = match file {
            CredentialFile::Present(record) => record.creation_timestamp,
            _ => None,
        };
        let age = created_ts.map(|ts| age_days(ts, now));
        let needs_refresh = age.is_some_and(|a| a >= f64::from(refresh_threshold_days));

        let message = match file {
            CredentialFile::Missing => Some("No token file found".to_string()),
            CredentialFile::Unreadable(reason) => Some(format!("Error reading token file: {reason}")),
            CredentialFile::Present(_) if created_ts.is_none() => {
                Some("Token file missing creation timestamp".to_string())
            }
            CredentialFile::Present(_) => None,
        };

        let age_days = age.map(round_tenth);
        Self {
            health,
            created: created_ts.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            age_days,
            days_until_expiry: age.map(|a| round_tenth(HARD_EXPIRY_DAYS - a)),
            needs_refresh,
            message,
            recommendation: recommendation(health, needs_refresh, age_days),
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn recommendation(health: TokenHealth, needs_refresh: bool, age_days: Option<f64>) -> String {
    if health == TokenHealth::Expired {
        "Token has expired. Run the bot to trigger automatic re-authentication.".to_string()
    } else if needs_refresh {
        format!(
            "Token is {:.1} days old. Consider running the bot to trigger proactive refresh.",
            age_days.unwrap_or_default()
        )
    } else if health == TokenHealth::Valid {
        "Token is healthy and fresh.".to_string()
    } else if health == TokenHealth::Absent {
        "No token file found. Run the bot to perform initial authentication.".to_string()
    } else {
        "Token status unclear. Check configuration and try running the bot.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    fn record_aged(days: f64) -> CredentialRecord {
        let created = now() - Duration::milliseconds((days * SECONDS_PER_DAY * 1000.0) as i64);
        CredentialRecord::issued(json!({"access_token": "a"}), created)
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_boundaries() {
        assert_eq!(classify_age(4.99, 5.0), TokenHealth::Valid);
        assert_eq!(classify_age(5.0, 5.0), TokenHealth::NearExpiry);
        assert_eq!(classify_age(6.99, 5.0), TokenHealth::NearExpiry);
        assert_eq!(classify_age(7.0, 5.0), TokenHealth::Expired);
    }

    #[test]
    fn test_threshold_at_or_above_hard_expiry_skips_near_expiry() {
        assert_eq!(classify_age(6.5, 7.0), TokenHealth::Valid);
        assert_eq!(classify_age(7.0, 9.0), TokenHealth::Expired);
    }

    #[test]
    fn test_missing_record_or_timestamp_is_invalid() {
        assert_eq!(classify(None, now(), 5), TokenHealth::Invalid);
        let mut record = record_aged(1.0);
        record.creation_timestamp = None;
        assert_eq!(classify(Some(&record), now(), 5), TokenHealth::Invalid);
    }

    #[test]
    fn test_file_states() {
        assert_eq!(classify_file(&CredentialFile::Missing, now(), 5), TokenHealth::Absent);
        assert_eq!(
            classify_file(&CredentialFile::Unreadable("eof".to_string()), now(), 5),
            TokenHealth::Invalid
        );
        assert_eq!(
            classify_file(&CredentialFile::Present(record_aged(8.0)), now(), 5),
            TokenHealth::Expired
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let record = record_aged(5.5);
        let first = classify(Some(&record), now(), 5);
        for _ in 0..10 {
            assert_eq!(classify(Some(&record), now(), 5), first);
        }
    }

    proptest! {
        #[test]
        fn prop_classification_matches_policy(threshold in 0u32..7, age in 0.0f64..30.0) {
            let health = classify_age(age, f64::from(threshold));
            if age >= HARD_EXPIRY_DAYS {
                prop_assert_eq!(health, TokenHealth::Expired);
            } else if age >= f64::from(threshold) {
                prop_assert_eq!(health, TokenHealth::NearExpiry);
            } else {
                prop_assert_eq!(health, TokenHealth::Valid);
            }
        }

        #[test]
        fn prop_missing_timestamp_always_invalid(threshold in 0u32..10, offset in -1_000_000i64..1_000_000) {
            let mut record = CredentialRecord::issued(json!({}), now() + Duration::seconds(offset));
            record.creation_timestamp = None;
            prop_assert_eq!(classify(Some(&record), now(), threshold), TokenHealth::Invalid);
        }
    }

    // ==================== Status Report Tests ====================

    #[test]
    fn test_status_three_days_old_is_valid() {
        let status = TokenStatus::evaluate(&CredentialFile::Present(record_aged(3.0)), now(), 5);
        assert_eq!(status.health, TokenHealth::Valid);
        assert_eq!(status.age_days, Some(3.0));
        assert_eq!(status.days_until_expiry, Some(4.0));
        assert!(!status.needs_refresh);
        assert_eq!(status.recommendation, "Token is healthy and fresh.");
    }

    #[test]
    fn test_status_six_days_old_needs_refresh() {
        let status = TokenStatus::evaluate(&CredentialFile::Present(record_aged(6.0)), now(), 5);
        assert_eq!(status.health, TokenHealth::NearExpiry);
        assert!(status.needs_refresh);
        assert_eq!(
            status.recommendation,
            "Token is 6.0 days old. Consider running the bot to trigger proactive refresh."
        );
    }

    #[test]
    fn test_status_expired() {
        let status = TokenStatus::evaluate(&CredentialFile::Present(record_aged(8.0)), now(), 5);
        assert_eq!(status.health, TokenHealth::Expired);
        assert_eq!(status.days_until_expiry, Some(-1.0));
        assert!(status.recommendation.starts_with("Token has expired"));
    }

    #[test]
    fn test_status_absent() {
        let status = TokenStatus::evaluate(&CredentialFile::Missing, now(), 5);
        assert_eq!(status.health, TokenHealth::Absent);
        assert!(status.created.is_none());
        assert!(!status.needs_refresh);
        assert!(status.recommendation.starts_with("No token file found"));
    }

    #[test]
    fn test_status_unreadable() {
        let status =
            TokenStatus::evaluate(&CredentialFile::Unreadable("bad json".to_string()), now(), 5);
        assert_eq!(status.health, TokenHealth::Invalid);
        assert!(status.message.unwrap().contains("bad json"));
        assert!(status.recommendation.starts_with("Token status unclear"));
    }

    #[test]
    fn test_status_serializes_snake_case_health() {
        let status = TokenStatus::evaluate(&CredentialFile::Present(record_aged(6.0)), now(), 5);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["health"], "near_expiry");
        assert_eq!(json["needs_refresh"], true);
    }
}
