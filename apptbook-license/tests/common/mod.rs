//! Shared test helpers for license tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use apptbook_license::{
    canonical_payload, ActivationStore, AuditLogEntry, DeviceFingerprint, Fingerprint,
    Fingerprinter, HostProbe, LicenseError, LicenseManager, LicenseRecord, LicenseResult,
    SignatureVerifier,
};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer};
use serde_json::Value;

/// Machine id the fixed fingerprinter reports ("abc123…", 64 hex chars).
pub const MACHINE_ID: &str = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";

/// A second, unrelated machine.
pub const OTHER_MACHINE_ID: &str =
    "ffff0000ffff0000ffff0000ffff0000ffff0000ffff0000ffff0000ffff0000";

/// The issuer's RSA-2048 key, generated once per test binary.
pub fn issuer_key() -> &'static PKey<Private> {
    static KEY: OnceLock<PKey<Private>> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

/// An unrelated RSA-2048 key.
pub fn rogue_key() -> &'static PKey<Private> {
    static KEY: OnceLock<PKey<Private>> = OnceLock::new();
    KEY.get_or_init(generate_key)
}

fn generate_key() -> PKey<Private> {
    let rsa = Rsa::generate(2048).unwrap();
    PKey::from_rsa(rsa).unwrap()
}

/// SubjectPublicKeyInfo PEM of `key`.
pub fn public_pem(key: &PKey<Private>) -> Vec<u8> {
    key.public_key_to_pem().unwrap()
}

/// Verifier loaded with the issuer's public key.
pub fn issuer_verifier() -> SignatureVerifier {
    SignatureVerifier::from_pem(&public_pem(issuer_key())).unwrap()
}

/// Signs the canonical payload of `fields` with RSA-PSS / SHA-256 / max salt.
pub fn sign_fields(key: &PKey<Private>, fields: &BTreeMap<String, Value>) -> String {
    let message = canonical_payload(fields).unwrap();
    let mut signer = Signer::new(MessageDigest::sha256(), key).unwrap();
    signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
    signer.set_rsa_mgf1_md(MessageDigest::sha256()).unwrap();
    signer
        .set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)
        .unwrap();
    signer.update(&message).unwrap();
    hex::encode(signer.sign_to_vec().unwrap())
}

/// License fields without a signature.
pub fn license_fields(
    machine_id: &str,
    license_key: &str,
    issued_at: &str,
    expires_at: Option<&str>,
) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    fields.insert("machine_id".to_string(), Value::from(machine_id));
    fields.insert("license_key".to_string(), Value::from(license_key));
    fields.insert("issued_at".to_string(), Value::from(issued_at));
    if let Some(expires_at) = expires_at {
        fields.insert("expires_at".to_string(), Value::from(expires_at));
    }
    fields
}

/// Adds a signature made with `key` and renders the license file (pretty JSON).
pub fn sign_license(key: &PKey<Private>, mut fields: BTreeMap<String, Value>) -> String {
    let signature = sign_fields(key, &fields);
    fields.insert("signature".to_string(), Value::from(signature));
    serde_json::to_string_pretty(&fields).unwrap()
}

/// A valid license for `machine_id` issued by the issuer key.
pub fn valid_license(machine_id: &str, expires_at: Option<&str>) -> String {
    sign_license(
        issuer_key(),
        license_fields(machine_id, "KEY-1", "2024-01-01T00:00:00", expires_at),
    )
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// In-memory [`ActivationStore`].
#[derive(Default)]
pub struct MemoryStore {
    license: Mutex<Option<LicenseRecord>>,
    device: Mutex<Option<DeviceFingerprint>>,
    audit: Mutex<Vec<AuditLogEntry>>,
    pub license_writes: Mutex<usize>,
    /// Makes `license_record` fail, like an undecodable row.
    pub fail_license_reads: AtomicBool,
    /// Makes `upsert_license_record` fail.
    pub fail_license_writes: AtomicBool,
}

impl MemoryStore {
    /// Store seeded with the first-run record.
    pub fn seeded() -> Arc<Self> {
        let store = Self::default();
        *store.license.lock().unwrap() = Some(LicenseRecord::default());
        Arc::new(store)
    }

    pub fn set_record(&self, record: LicenseRecord) {
        *self.license.lock().unwrap() = Some(record);
    }

    pub fn record(&self) -> LicenseRecord {
        self.license.lock().unwrap().clone().expect("license record")
    }

    pub fn device(&self) -> Option<DeviceFingerprint> {
        self.device.lock().unwrap().clone()
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.audit
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action_type.clone())
            .collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.audit.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        *self.license_writes.lock().unwrap()
    }

    pub fn set_read_failure(&self, fail: bool) {
        self.fail_license_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_failure(&self, fail: bool) {
        self.fail_license_writes.store(fail, Ordering::SeqCst);
    }
}

impl ActivationStore for MemoryStore {
    fn license_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        if self.fail_license_reads.load(Ordering::SeqCst) {
            return Err(LicenseError::Storage(
                "invalid data in column signature_status: Invalid Signature".to_string(),
            ));
        }
        Ok(self.license.lock().unwrap().clone())
    }

    fn upsert_license_record(&self, record: &LicenseRecord) -> LicenseResult<()> {
        if self.fail_license_writes.load(Ordering::SeqCst) {
            return Err(LicenseError::Storage("disk I/O error".to_string()));
        }
        *self.license.lock().unwrap() = Some(record.clone());
        *self.license_writes.lock().unwrap() += 1;
        Ok(())
    }

    fn device_info(&self) -> LicenseResult<Option<DeviceFingerprint>> {
        Ok(self.device.lock().unwrap().clone())
    }

    fn upsert_device_info(&self, device: &DeviceFingerprint) -> LicenseResult<()> {
        *self.device.lock().unwrap() = Some(device.clone());
        Ok(())
    }

    fn append_audit_log(&self, entry: &AuditLogEntry) -> LicenseResult<()> {
        self.audit.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Fingerprinter that always reports the same machine id.
pub struct FixedFingerprinter {
    pub machine_id: String,
    pub degraded: bool,
}

impl FixedFingerprinter {
    pub fn new(machine_id: &str) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            degraded: false,
        }
    }
}

impl Fingerprinter for FixedFingerprinter {
    fn generate(&self) -> Fingerprint {
        Fingerprint {
            device: DeviceFingerprint {
                machine_id_hash: self.machine_id.clone(),
                bios_uuid: "host-0242ac110002".to_string(),
                disk_serial: "D-12345-ABC".to_string(),
                mac_address: "02:42:ac:11:00:02".to_string(),
            },
            degraded: self
                .degraded
                .then(|| "MAC address unavailable".to_string()),
        }
    }
}

/// [`HostProbe`] returning fixed identifiers.
#[derive(Clone)]
pub struct StaticProbe {
    pub hostname: Option<String>,
    pub mac: Option<String>,
    pub disk: Option<String>,
}

impl StaticProbe {
    pub fn new(hostname: &str, mac: Option<&str>, disk: Option<&str>) -> Self {
        Self {
            hostname: Some(hostname.to_string()),
            mac: mac.map(String::from),
            disk: disk.map(String::from),
        }
    }
}

impl HostProbe for StaticProbe {
    fn hostname(&self) -> Option<String> {
        self.hostname.clone()
    }

    fn mac_address(&self) -> Option<String> {
        self.mac.clone()
    }

    fn disk_serial(&self) -> Option<String> {
        self.disk.clone()
    }
}

pub type TestManager = LicenseManager<Arc<MemoryStore>, FixedFingerprinter>;

/// Manager on machine [`MACHINE_ID`] with the issuer key and a license path in `dir`.
pub fn test_manager(store: &Arc<MemoryStore>, dir: &Path) -> TestManager {
    LicenseManager::new(
        Arc::clone(store),
        FixedFingerprinter::new(MACHINE_ID),
        issuer_verifier(),
        dir.join("license.json"),
    )
}
