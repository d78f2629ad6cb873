//! Activation state machine.
//!
//! `NeverActivated → Active` through [`LicenseManager::activate_from_file`],
//! `Active → Expired` through [`LicenseManager::check_activation_status`],
//! and any failed attempt lands in `Invalid(reason)`. The persisted
//! `signature_status` is the durable copy of the last observed state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::artifact::LicenseArtifact;
use crate::config::{LicenseConfig, DEFAULT_LICENSE_FILE};
use crate::device::{FingerprintGenerator, Fingerprinter};
use crate::error::{LicenseError, LicenseResult};
use crate::record::{
    format_timestamp, is_expired_on, now, parse_timestamp, AuditAction, AuditLogEntry,
    LicenseRecord,
};
use crate::signature::SignatureVerifier;
use crate::state::{InvalidReason, LicenseState};
use crate::store::ActivationStore;

/// Validates and activates the local license.
///
/// Every public operation reports through a boolean plus the persisted
/// record and audit log; errors never reach the caller.
pub struct LicenseManager<S, F = FingerprintGenerator> {
    store: S,
    fingerprinter: F,
    verifier: SignatureVerifier,
    license_path: PathBuf,
    write_lock: Mutex<()>,
}

impl<S: ActivationStore> LicenseManager<S> {
    /// Creates a manager for the real host using the configured paths.
    ///
    /// The public key is read once here.
    pub fn from_config(store: S, config: &LicenseConfig) -> Self {
        Self::new(
            store,
            FingerprintGenerator::new(),
            SignatureVerifier::load(&config.public_key_file),
            config.license_file.clone(),
        )
    }
}

impl<S: ActivationStore, F: Fingerprinter> LicenseManager<S, F> {
    /// Creates a manager from its collaborators.
    ///
    /// A verifier without a key is recorded as `LICENSE_ERROR` in the audit log.
    pub fn new(
        store: S,
        fingerprinter: F,
        verifier: SignatureVerifier,
        license_path: impl Into<PathBuf>,
    ) -> Self {
        let manager = Self {
            store,
            fingerprinter,
            verifier,
            license_path: license_path.into(),
            write_lock: Mutex::new(()),
        };

        if let Some(reason) = manager.verifier.load_error() {
            manager.audit(
                AuditAction::LicenseError,
                format!("Public key unavailable: {reason}"),
            );
        }
        manager
    }

    /// The license file checked at startup.
    #[must_use]
    pub fn license_path(&self) -> &Path {
        &self.license_path
    }

    /// Returns true if a public key is loaded.
    #[must_use]
    pub fn has_public_key(&self) -> bool {
        self.verifier.is_loaded()
    }

    /// Startup check.
    ///
    /// An active record is trusted without re-verifying the signature, unless
    /// its expiry day has passed, in which case it flips to `Expired`. An
    /// inactive, missing or unreadable record triggers activation from the
    /// configured license file.
    pub fn check_activation_status(&self) -> bool {
        let _guard = self.lock();

        let record = match self.store.license_record() {
            Ok(record) => record,
            Err(e) => {
                // Re-activating overwrites the unreadable row.
                error!("Failed to read license record: {}", e);
                self.audit(
                    AuditAction::LicenseError,
                    format!("License record unreadable: {e}"),
                );
                None
            }
        };

        match record {
            Some(record) if record.is_active => {
                let now = now();
                if record.is_expired_on(now.date()) {
                    let expired_on = record.expires_at.map(format_timestamp).unwrap_or_default();
                    info!("License expired on {}", expired_on);
                    if let Err(e) = self.store.upsert_license_record(&record.into_expired(now)) {
                        error!("Failed to persist expired license state: {}", e);
                    }
                    self.audit(
                        AuditAction::LicenseExpired,
                        format!("License expired on {expired_on}"),
                    );
                    return false;
                }
                debug!("License active");
                true
            }
            _ => self.activate_locked(&self.license_path),
        }
    }

    /// Activates from the license file at `path`.
    ///
    /// Key, file, signature, field types, machine binding and expiry are
    /// checked in that order; the first failure is persisted as
    /// `Invalid(reason)`.
    pub fn activate_from_file(&self, path: impl AsRef<Path>) -> bool {
        let _guard = self.lock();
        self.activate_locked(path.as_ref())
    }

    /// Activates from the configured license file.
    pub fn activate(&self) -> bool {
        self.activate_from_file(&self.license_path)
    }

    /// Copies a user-selected license file into place and activates it.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidFileName`] if the file is not named like
    /// the configured license file and an IO error if the copy fails. Once
    /// the file is in place the activation outcome is the `Ok` value.
    pub fn import_license_file(&self, selected: impl AsRef<Path>) -> LicenseResult<bool> {
        let selected = selected.as_ref();
        let expected = self
            .license_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_LICENSE_FILE);
        let name_matches = selected
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(expected));
        if !name_matches {
            return Err(LicenseError::InvalidFileName(selected.display().to_string()));
        }

        let _guard = self.lock();
        if let Err(e) = copy_into_place(selected, &self.license_path) {
            warn!("Failed to copy license file {}: {}", selected.display(), e);
            self.audit(AuditAction::LicenseFailed, format!("File copy failed: {e}"));
            return Err(e.into());
        }
        info!("Imported license file from {}", selected.display());
        Ok(self.activate_locked(&self.license_path))
    }

    /// Computes this device's machine id and stores the device record.
    pub fn get_current_machine_id(&self) -> String {
        let fingerprint = self.fingerprinter.generate();

        if let Some(reason) = &fingerprint.degraded {
            warn!("Device fingerprint degraded: {}", reason);
            self.audit(AuditAction::FingerprintDegraded, reason.clone());
        }
        if let Err(e) = self.store.upsert_device_info(&fingerprint.device) {
            warn!("Failed to persist device info: {}", e);
        }

        fingerprint.device.machine_id_hash
    }

    /// The persisted license record, for display.
    ///
    /// # Errors
    ///
    /// Propagates storage errors.
    pub fn license_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        self.store.license_record()
    }

    /// The persisted state; unreadable storage reads as `NeverActivated`.
    #[must_use]
    pub fn state(&self) -> LicenseState {
        match self.store.license_record() {
            Ok(Some(record)) => record.signature_status,
            Ok(None) => LicenseState::NeverActivated,
            Err(e) => {
                warn!("Failed to read license record: {}", e);
                LicenseState::NeverActivated
            }
        }
    }

    fn activate_locked(&self, path: &Path) -> bool {
        let now = now();

        match self.verify_license(path, now) {
            Ok(record) => {
                if let Err(e) = self.store.upsert_license_record(&record) {
                    error!("Failed to persist activated license: {}", e);
                    self.audit(
                        AuditAction::LicenseFailed,
                        format!("Failed to persist activated license: {e}"),
                    );
                    return false;
                }
                info!("License {} activated", record.license_key);
                self.audit(
                    AuditAction::LicenseSuccess,
                    format!(
                        "Program activated successfully with key: {}",
                        record.license_key
                    ),
                );
                true
            }
            Err(err) => {
                let reason = InvalidReason::from(&err);
                warn!("License activation failed ({}): {}", reason, err);
                if let Err(e) = self
                    .store
                    .upsert_license_record(&LicenseRecord::failed(reason, now))
                {
                    error!("Failed to persist license failure: {}", e);
                }
                self.audit(AuditAction::LicenseFailed, format!("{reason}: {err}"));
                false
            }
        }
    }

    /// The activation pipeline; short-circuits at the first failure.
    fn verify_license(&self, path: &Path, now: NaiveDateTime) -> LicenseResult<LicenseRecord> {
        if !self.verifier.is_loaded() {
            return Err(LicenseError::KeyMissing);
        }

        let artifact = LicenseArtifact::read_from(path)?;

        let signature = artifact.signature().ok_or(LicenseError::SignatureMismatch)?;
        self.verifier.check(&artifact.signed_fields(), signature)?;

        let licensed_machine = artifact.require_str("machine_id")?;
        let license_key = artifact.require_str("license_key")?;
        let issued_at = parse_timestamp(artifact.require_str("issued_at")?)?;
        let expires_at = artifact
            .optional_str("expires_at")?
            .map(parse_timestamp)
            .transpose()?;

        let machine_id = self.get_current_machine_id();
        if licensed_machine != machine_id {
            return Err(LicenseError::MachineMismatch {
                expected: licensed_machine.to_string(),
                actual: machine_id,
            });
        }

        if let Some(expires_at) = expires_at {
            if is_expired_on(expires_at, now.date()) {
                return Err(LicenseError::Expired(format_timestamp(expires_at)));
            }
        }

        Ok(LicenseRecord::activated(
            license_key,
            machine_id,
            Some(issued_at),
            expires_at,
            now,
        ))
    }

    fn audit(&self, action: AuditAction, details: impl Into<String>) {
        let entry = AuditLogEntry::new(action, details);
        if let Err(e) = self.store.append_audit_log(&entry) {
            warn!("Failed to append {} audit entry: {}", action, e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn copy_into_place(selected: &Path, target: &Path) -> std::io::Result<()> {
    // Copying a file onto itself would truncate it.
    if let (Ok(a), Ok(b)) = (selected.canonicalize(), target.canonicalize()) {
        if a == b {
            return Ok(());
        }
    }
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::copy(selected, target)?;
    Ok(())
}
