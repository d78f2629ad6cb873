//! RSA-PSS verification of license files.
//!
//! The signed message is the canonical JSON of every license field except
//! `signature`: keys sorted lexicographically, no whitespace, UTF-8. The
//! signature is RSA-PSS with SHA-256, MGF1(SHA-256) and maximum salt length,
//! hex encoded.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Verifier};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifact::SIGNATURE_FIELD;
use crate::error::{LicenseError, LicenseResult};

/// Serializes license fields into the exact bytes that are signed.
///
/// The `signature` field is skipped if present.
///
/// # Errors
///
/// Returns [`LicenseError::Serialization`] if a value cannot be serialized.
pub fn canonical_payload(fields: &BTreeMap<String, Value>) -> LicenseResult<Vec<u8>> {
    let signed: BTreeMap<&str, &Value> = fields
        .iter()
        .filter(|(name, _)| name.as_str() != SIGNATURE_FIELD)
        .map(|(name, value)| (name.as_str(), value))
        .collect();
    Ok(serde_json::to_vec(&signed)?)
}

/// Verifies license signatures against a public key loaded once at startup.
///
/// Without a key the verifier is fail-closed: every verification is rejected.
pub struct SignatureVerifier {
    key: Option<PKey<Public>>,
    load_error: Option<String>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("loaded", &self.key.is_some())
            .field("load_error", &self.load_error)
            .finish()
    }
}

impl SignatureVerifier {
    /// Loads the PEM public key at `path`.
    ///
    /// Never fails: a missing or corrupt key yields a fail-closed verifier
    /// whose [`load_error`](Self::load_error) says why.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let result = fs::read(path)
            .map_err(|e| LicenseError::KeyLoad(format!("{}: {e}", path.display())))
            .and_then(|pem| parse_public_key(&pem));

        match result {
            Ok(key) => {
                info!("Loaded license public key from {}", path.display());
                Self {
                    key: Some(key),
                    load_error: None,
                }
            }
            Err(e) => {
                warn!("KeyMissing: license verification disabled: {}", e);
                Self::unloaded(e.to_string())
            }
        }
    }

    /// Builds a verifier from PEM bytes (SubjectPublicKeyInfo or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::KeyLoad`] if the PEM is not an RSA public key.
    pub fn from_pem(pem: &[u8]) -> LicenseResult<Self> {
        Ok(Self {
            key: Some(parse_public_key(pem)?),
            load_error: None,
        })
    }

    /// A verifier without a key.
    #[must_use]
    pub fn unloaded(reason: impl Into<String>) -> Self {
        Self {
            key: None,
            load_error: Some(reason.into()),
        }
    }

    /// Returns true if a public key is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.key.is_some()
    }

    /// Why the key could not be loaded, if it wasn't.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Verifies `signature_hex` over the canonical form of `payload`.
    ///
    /// Any failure, including malformed hex or a crypto error, is `false`.
    #[must_use]
    pub fn verify(&self, payload: &BTreeMap<String, Value>, signature_hex: &str) -> bool {
        self.check(payload, signature_hex).is_ok()
    }

    /// Like [`verify`](Self::verify) but says why verification failed.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::KeyMissing`] without a key and
    /// [`LicenseError::SignatureMismatch`] for everything else.
    pub fn check(&self, payload: &BTreeMap<String, Value>, signature_hex: &str) -> LicenseResult<()> {
        let Some(key) = &self.key else {
            warn!("KeyMissing: rejecting license signature");
            return Err(LicenseError::KeyMissing);
        };

        let signature = hex::decode(signature_hex.trim()).map_err(|e| {
            debug!("Signature is not valid hex: {}", e);
            LicenseError::SignatureMismatch
        })?;
        if signature.is_empty() {
            return Err(LicenseError::SignatureMismatch);
        }

        let message = canonical_payload(payload).map_err(|e| {
            debug!("Cannot canonicalize license payload: {}", e);
            LicenseError::SignatureMismatch
        })?;

        match pss_verify(key, &message, &signature) {
            Ok(true) => Ok(()),
            Ok(false) => Err(LicenseError::SignatureMismatch),
            Err(e) => {
                debug!("RSA-PSS verification error: {}", e);
                Err(LicenseError::SignatureMismatch)
            }
        }
    }
}

fn parse_public_key(pem: &[u8]) -> LicenseResult<PKey<Public>> {
    let key = PKey::public_key_from_pem(pem)
        .or_else(|_| Rsa::public_key_from_pem_pkcs1(pem).and_then(PKey::from_rsa))
        .map_err(|e| LicenseError::KeyLoad(format!("invalid PEM public key: {e}")))?;

    if key.rsa().is_err() {
        return Err(LicenseError::KeyLoad("public key is not an RSA key".to_string()));
    }
    Ok(key)
}

fn pss_verify(key: &PKey<Public>, message: &[u8], signature: &[u8]) -> Result<bool, ErrorStack> {
    let mut verifier = Verifier::new(MessageDigest::sha256(), key)?;
    verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
    verifier.set_rsa_mgf1_md(MessageDigest::sha256())?;
    verifier.set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)?;
    verifier.update(message)?;
    verifier.verify(signature)
}
