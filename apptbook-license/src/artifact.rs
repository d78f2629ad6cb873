//! License file parsing.
//!
//! A license file is a flat JSON object:
//!
//! ```json
//! {
//!   "machine_id": "<64 hex chars>",
//!   "license_key": "KEY-1",
//!   "issued_at": "2024-01-01T00:00:00",
//!   "expires_at": "2099-01-01T00:00:00",
//!   "signature": "<hex RSA-PSS signature>"
//! }
//! ```
//!
//! The file is untrusted. Parsing here is purely structural; the signature,
//! machine binding and expiry are checked by [`crate::LicenseManager`].

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use crate::error::{LicenseError, LicenseResult};

/// Name of the field holding the detached signature.
pub const SIGNATURE_FIELD: &str = "signature";

/// A parsed, not yet verified, license file.
#[derive(Debug, Clone, PartialEq)]
pub struct LicenseArtifact {
    fields: BTreeMap<String, Value>,
}

impl LicenseArtifact {
    /// Reads and parses a license file.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::FileMissing`] if the file cannot be read and
    /// [`LicenseError::MalformedArtifact`] if it is not a flat JSON object.
    pub fn read_from(path: &Path) -> LicenseResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LicenseError::FileMissing(path.display().to_string()),
            _ => LicenseError::FileMissing(format!("{}: {e}", path.display())),
        })?;
        Self::parse(&text)
    }

    /// Parses license JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedArtifact`] if the text is not a JSON
    /// object or any field holds an array or object.
    pub fn parse(text: &str) -> LicenseResult<Self> {
        let value: Value = serde_json::from_str(text.trim_start_matches('\u{feff}'))
            .map_err(|e| LicenseError::MalformedArtifact(format!("invalid JSON: {e}")))?;

        let Value::Object(map) = value else {
            return Err(LicenseError::MalformedArtifact(
                "license must be a JSON object".to_string(),
            ));
        };

        if let Some((name, _)) = map.iter().find(|(_, v)| v.is_array() || v.is_object()) {
            return Err(LicenseError::MalformedArtifact(format!(
                "field '{name}' must be a scalar"
            )));
        }

        Ok(Self {
            fields: map.into_iter().collect(),
        })
    }

    /// All fields, including the signature, in key order.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Every field except the signature; this is what gets signed.
    #[must_use]
    pub fn signed_fields(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != SIGNATURE_FIELD)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Machine id the license was issued for.
    #[must_use]
    pub fn machine_id(&self) -> Option<&str> {
        self.str_field("machine_id")
    }

    /// License key.
    #[must_use]
    pub fn license_key(&self) -> Option<&str> {
        self.str_field("license_key")
    }

    /// Raw `issued_at` timestamp.
    #[must_use]
    pub fn issued_at(&self) -> Option<&str> {
        self.str_field("issued_at")
    }

    /// Raw `expires_at` timestamp; absent or `null` means no expiry.
    #[must_use]
    pub fn expires_at(&self) -> Option<&str> {
        self.str_field("expires_at")
    }

    /// Hex-encoded signature.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.str_field(SIGNATURE_FIELD)
    }

    /// A field that must be present and hold a string.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedArtifact`] if the field is missing or
    /// holds any other JSON type.
    pub fn require_str(&self, name: &str) -> LicenseResult<&str> {
        match self.fields.get(name) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(other) => Err(not_a_string(name, other)),
            None => Err(LicenseError::MalformedArtifact(format!(
                "missing field '{name}'"
            ))),
        }
    }

    /// A field that may be absent or `null`, and otherwise holds a string.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedArtifact`] if the field holds a
    /// number or boolean.
    pub fn optional_str(&self, name: &str) -> LicenseResult<Option<&str>> {
        match self.fields.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(not_a_string(name, other)),
        }
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

fn not_a_string(name: &str, value: &Value) -> LicenseError {
    LicenseError::MalformedArtifact(format!("field '{name}' must be a string, got {value}"))
}
