//! Activation state machine states and their durable string encoding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LicenseError;

/// Why an activation attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    /// No usable public key, so nothing can be verified.
    KeyMissing,
    /// License file missing, unreadable or structurally corrupt.
    FileMissing,
    /// Signature does not cover the license fields.
    SignatureMismatch,
    /// License was issued for another machine.
    MachineMismatch,
    /// License was already past its expiry date when presented.
    Expired,
}

impl InvalidReason {
    /// Returns the persisted status string for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyMissing => "KeyMissing",
            Self::FileMissing => "FileMissing",
            Self::SignatureMismatch => "SignatureMismatch",
            Self::MachineMismatch => "MachineMismatch",
            Self::Expired => "ExpiredOnActivation",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&LicenseError> for InvalidReason {
    fn from(err: &LicenseError) -> Self {
        match err {
            LicenseError::KeyMissing | LicenseError::KeyLoad(_) => Self::KeyMissing,
            LicenseError::SignatureMismatch => Self::SignatureMismatch,
            LicenseError::MachineMismatch { .. } => Self::MachineMismatch,
            LicenseError::Expired(_) => Self::Expired,
            LicenseError::FileMissing(_)
            | LicenseError::MalformedArtifact(_)
            | LicenseError::InvalidTimestamp(_)
            | LicenseError::InvalidFileName(_)
            | LicenseError::Config(_)
            | LicenseError::Storage(_)
            | LicenseError::Io(_)
            | LicenseError::Serialization(_) => Self::FileMissing,
        }
    }
}

/// The current license state, persisted as `signature_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LicenseState {
    /// No activation has ever been attempted.
    NeverActivated,
    /// License verified and bound to this machine.
    Active,
    /// A previously active license passed its expiry date.
    Expired,
    /// The last activation attempt failed.
    Invalid(InvalidReason),
}

impl LicenseState {
    /// Returns the persisted status string.
    #[must_use]
    pub fn as_status(&self) -> &'static str {
        match self {
            Self::NeverActivated => "NeverActivated",
            Self::Active => "Valid",
            Self::Expired => "Expired",
            Self::Invalid(reason) => reason.as_str(),
        }
    }

    /// Returns true if the license allows app usage.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LicenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status())
    }
}

/// A status string that does not name any [`LicenseState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown license status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for LicenseState {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NeverActivated" => Self::NeverActivated,
            "Valid" => Self::Active,
            "Expired" => Self::Expired,
            "KeyMissing" => Self::Invalid(InvalidReason::KeyMissing),
            "FileMissing" => Self::Invalid(InvalidReason::FileMissing),
            "SignatureMismatch" => Self::Invalid(InvalidReason::SignatureMismatch),
            "MachineMismatch" => Self::Invalid(InvalidReason::MachineMismatch),
            "ExpiredOnActivation" => Self::Invalid(InvalidReason::Expired),
            other => return Err(UnknownStatus(other.to_string())),
        })
    }
}

impl From<LicenseState> for String {
    fn from(state: LicenseState) -> Self {
        state.as_status().to_string()
    }
}

impl TryFrom<String> for LicenseState {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
