//! Persistence collaborator consumed by the licensing core.

use std::sync::Arc;

use crate::device::DeviceFingerprint;
use crate::error::LicenseResult;
use crate::record::{AuditLogEntry, LicenseRecord};

/// Storage for the singleton license record, the singleton device record and
/// the append-only audit log.
///
/// Implementations must write the singletons atomically under a fixed key
/// (upsert-by-replace), so repeated writes always converge to one row.
pub trait ActivationStore: Send + Sync {
    /// Loads the license record, if one exists.
    fn license_record(&self) -> LicenseResult<Option<LicenseRecord>>;

    /// Replaces the license record.
    fn upsert_license_record(&self, record: &LicenseRecord) -> LicenseResult<()>;

    /// Loads the stored device fingerprint, if one exists.
    fn device_info(&self) -> LicenseResult<Option<DeviceFingerprint>>;

    /// Replaces the stored device fingerprint.
    fn upsert_device_info(&self, device: &DeviceFingerprint) -> LicenseResult<()>;

    /// Appends an entry to the audit log.
    fn append_audit_log(&self, entry: &AuditLogEntry) -> LicenseResult<()>;
}

impl<T: ActivationStore + ?Sized> ActivationStore for Arc<T> {
    fn license_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        (**self).license_record()
    }

    fn upsert_license_record(&self, record: &LicenseRecord) -> LicenseResult<()> {
        (**self).upsert_license_record(record)
    }

    fn device_info(&self) -> LicenseResult<Option<DeviceFingerprint>> {
        (**self).device_info()
    }

    fn upsert_device_info(&self, device: &DeviceFingerprint) -> LicenseResult<()> {
        (**self).upsert_device_info(device)
    }

    fn append_audit_log(&self, entry: &AuditLogEntry) -> LicenseResult<()> {
        (**self).append_audit_log(entry)
    }
}
