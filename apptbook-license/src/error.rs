//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
///
/// None of these escape [`crate::LicenseManager`]'s activation surface: the
/// manager maps each one to an [`crate::InvalidReason`], persists it and
/// returns `false`.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No public key is loaded, so nothing can be verified.
    #[error("public key not loaded")]
    KeyMissing,

    /// The public key file exists but could not be read or parsed.
    #[error("failed to load public key: {0}")]
    KeyLoad(String),

    /// License file missing or unreadable.
    #[error("license file not found: {0}")]
    FileMissing(String),

    /// License file is not a JSON object of scalar fields.
    #[error("malformed license file: {0}")]
    MalformedArtifact(String),

    /// RSA-PSS signature verification failed.
    #[error("license signature invalid")]
    SignatureMismatch,

    /// License is bound to a different machine.
    #[error("machine id mismatch (license {expected}, device {actual})")]
    MachineMismatch {
        /// Machine id carried by the license.
        expected: String,
        /// Fingerprint of this device.
        actual: String,
    },

    /// License has expired.
    #[error("license expired on {0}")]
    Expired(String),

    /// A timestamp field could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Imported file does not carry the expected license file name.
    #[error("not a license file: {0}")]
    InvalidFileName(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Storage error reported by the persistence collaborator.
    #[error("storage error: {0}")]
    Storage(String),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
