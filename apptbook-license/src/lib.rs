//! Offline licensing and activation for Apptbook.
//!
//! This module handles:
//! - Device fingerprinting for machine binding
//! - RSA-PSS verification of signed license files
//! - The activation state machine and its persisted trust state
//!
//! # Design Principles
//!
//! - **Offline only**: no license server, no network calls
//! - **Fail-closed**: without a usable public key nothing activates
//! - **Machine binding**: a license names the fingerprint it was issued for
//! - **No errors upward**: callers get a boolean; the reason is persisted as
//!   `signature_status` and written to the audit log
//!
//! # License File Format
//!
//! A flat JSON object with `machine_id`, `license_key`, `issued_at`, optional
//! `expires_at` and a hex `signature` over the canonical JSON (sorted keys,
//! no whitespace) of all other fields.

mod artifact;
mod config;
mod device;
mod error;
mod manager;
mod record;
mod signature;
mod state;
mod store;

pub use artifact::{LicenseArtifact, SIGNATURE_FIELD};
pub use config::{
    LicenseConfig, DEFAULT_DATABASE_FILE, DEFAULT_LICENSE_FILE, DEFAULT_PUBLIC_KEY_FILE,
};
pub use device::{
    DeviceFingerprint, DeviceInfo, Fingerprint, FingerprintGenerator, Fingerprinter, HostProbe,
    SystemProbe, UNAVAILABLE,
};
pub use error::{LicenseError, LicenseResult};
pub use manager::LicenseManager;
pub use record::{
    format_timestamp, is_expired_on, now, parse_timestamp, AuditAction, AuditLogEntry,
    LicenseRecord, NO_LICENSE_KEY, TIMESTAMP_FORMAT,
};
pub use signature::{canonical_payload, SignatureVerifier};
pub use state::{InvalidReason, LicenseState, UnknownStatus};
pub use store::ActivationStore;
