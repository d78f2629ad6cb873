//! File locations used by the licensing core.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};

/// Default license file name; imports must carry this name.
pub const DEFAULT_LICENSE_FILE: &str = "license.json";

/// Default public key location.
pub const DEFAULT_PUBLIC_KEY_FILE: &str = "config/public_key.pem";

/// Default database file.
pub const DEFAULT_DATABASE_FILE: &str = "appointment_manager.db";

/// Where the license file, public key and database live.
///
/// Loaded from TOML; every field is optional:
///
/// ```toml
/// license_file = "license.json"
/// public_key_file = "config/public_key.pem"
/// database_file = "appointment_manager.db"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// License file activated at startup and overwritten by imports.
    pub license_file: PathBuf,
    /// PEM-encoded RSA public key.
    pub public_key_file: PathBuf,
    /// SQLite database holding the license, device and audit tables.
    pub database_file: PathBuf,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            license_file: PathBuf::from(DEFAULT_LICENSE_FILE),
            public_key_file: PathBuf::from(DEFAULT_PUBLIC_KEY_FILE),
            database_file: PathBuf::from(DEFAULT_DATABASE_FILE),
        }
    }
}

impl LicenseConfig {
    /// Loads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read and
    /// [`LicenseError::Config`] if it is not valid TOML for this struct.
    pub fn load(path: &Path) -> LicenseResult<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| LicenseError::Config(format!("{}: {e}", path.display())))
    }

    /// Resolves relative paths against `base`. Absolute paths are kept.
    #[must_use]
    pub fn with_base_dir(self, base: &Path) -> Self {
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        Self {
            license_file: resolve(self.license_file),
            public_key_file: resolve(self.public_key_file),
            database_file: resolve(self.database_file),
        }
    }
}
