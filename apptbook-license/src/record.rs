//! Persisted license records, audit entries and timestamp handling.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};
use crate::state::{InvalidReason, LicenseState};

/// License key stored while no license has been activated.
pub const NO_LICENSE_KEY: &str = "N/A";

/// Format used for every persisted timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// The singleton license record.
///
/// Always written whole (upsert-by-replace); the manager never patches
/// individual columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Key of the activated license, or [`NO_LICENSE_KEY`].
    pub license_key: String,
    /// Whether the app is currently activated.
    pub is_active: bool,
    /// Fingerprint the license was activated on.
    pub machine_id_used: Option<String>,
    /// Issue timestamp from the license file.
    pub issued_at: Option<NaiveDateTime>,
    /// Expiry timestamp from the license file; `None` never expires.
    pub expires_at: Option<NaiveDateTime>,
    /// Last observed state.
    pub signature_status: LicenseState,
    /// When the license was last checked or activated.
    pub last_check_date: Option<NaiveDateTime>,
}

impl Default for LicenseRecord {
    /// The first-run record: inactive, never activated.
    fn default() -> Self {
        Self {
            license_key: NO_LICENSE_KEY.to_string(),
            is_active: false,
            machine_id_used: None,
            issued_at: None,
            expires_at: None,
            signature_status: LicenseState::NeverActivated,
            last_check_date: None,
        }
    }
}

impl LicenseRecord {
    /// Record written after a successful activation.
    #[must_use]
    pub fn activated(
        license_key: impl Into<String>,
        machine_id: impl Into<String>,
        issued_at: Option<NaiveDateTime>,
        expires_at: Option<NaiveDateTime>,
        checked_at: NaiveDateTime,
    ) -> Self {
        Self {
            license_key: license_key.into(),
            is_active: true,
            machine_id_used: Some(machine_id.into()),
            issued_at,
            expires_at,
            signature_status: LicenseState::Active,
            last_check_date: Some(checked_at),
        }
    }

    /// Record written after a failed activation attempt.
    #[must_use]
    pub fn failed(reason: InvalidReason, checked_at: NaiveDateTime) -> Self {
        Self {
            signature_status: LicenseState::Invalid(reason),
            last_check_date: Some(checked_at),
            ..Self::default()
        }
    }

    /// Turns an active record into an expired one, keeping the license details.
    #[must_use]
    pub fn into_expired(self, checked_at: NaiveDateTime) -> Self {
        Self {
            is_active: false,
            signature_status: LicenseState::Expired,
            last_check_date: Some(checked_at),
            ..self
        }
    }

    /// Returns true if the license expired before `today`.
    #[must_use]
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expires_at.is_some_and(|exp| is_expired_on(exp, today))
    }
}

/// Date-granular expiry: a license stays valid through its whole `expires_at` day.
#[must_use]
pub fn is_expired_on(expires_at: NaiveDateTime, today: NaiveDate) -> bool {
    expires_at.date() < today
}

/// Current local wall-clock time.
#[must_use]
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Formats a timestamp the way it is persisted (`YYYY-MM-DDTHH:MM:SS[.f]`).
#[must_use]
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses an ISO-8601 timestamp.
///
/// Accepts `YYYY-MM-DDTHH:MM:SS` with optional fractional seconds, RFC 3339
/// with an offset (kept as wall-clock time in that offset), or a bare date.
///
/// # Errors
///
/// Returns [`LicenseError::InvalidTimestamp`] if none of the forms match.
pub fn parse_timestamp(raw: &str) -> LicenseResult<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_local()))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| LicenseError::InvalidTimestamp(raw.to_string()))
}

/// Audit actions written by the licensing core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// Activation succeeded.
    LicenseSuccess,
    /// Activation failed.
    LicenseFailed,
    /// Licensing cannot work at all (public key unavailable).
    LicenseError,
    /// An active license passed its expiry date.
    LicenseExpired,
    /// Machine id fell back to the host name.
    FingerprintDegraded,
}

impl AuditAction {
    /// Returns the stored `action_type` string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LicenseSuccess => "LICENSE_SUCCESS",
            Self::LicenseFailed => "LICENSE_FAILED",
            Self::LicenseError => "LICENSE_ERROR",
            Self::LicenseExpired => "LICENSE_EXPIRED",
            Self::FingerprintDegraded => "DEVICE_FINGERPRINT_DEGRADED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit log entry.
///
/// `action_type` is a plain string because the log is shared with the rest
/// of the application, which writes its own action types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// When the action happened.
    pub timestamp: NaiveDateTime,
    /// Action identifier, e.g. `LICENSE_SUCCESS`.
    pub action_type: String,
    /// Free-form details.
    pub details: String,
    /// Acting user, if any.
    pub user_id: Option<i64>,
}

impl AuditLogEntry {
    /// Creates an entry for a licensing action, stamped now.
    #[must_use]
    pub fn new(action: AuditAction, details: impl Into<String>) -> Self {
        Self {
            timestamp: now(),
            action_type: action.as_str().to_string(),
            details: details.into(),
            user_id: None,
        }
    }

    /// Attaches the acting user.
    #[must_use]
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}
