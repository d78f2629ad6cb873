//! Shared test helpers for database tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use apptbook_license::canonical_payload;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{RsaPssSaltlen, Signer};
use serde_json::Value;

/// The issuer's RSA-2048 key, generated once per test binary.
pub fn issuer_key() -> &'static PKey<Private> {
    static KEY: OnceLock<PKey<Private>> = OnceLock::new();
    KEY.get_or_init(|| PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap())
}

/// Writes `contents` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    path
}

/// Writes the issuer's public key as `config/public_key.pem` under `dir`.
pub fn install_public_key(dir: &Path) -> PathBuf {
    write_file(
        dir,
        "config/public_key.pem",
        issuer_key().public_key_to_pem().unwrap(),
    )
}

/// A license for `machine_id` signed with RSA-PSS / SHA-256 / max salt.
pub fn signed_license(machine_id: &str, license_key: &str, expires_at: Option<&str>) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("machine_id".to_string(), Value::from(machine_id));
    fields.insert("license_key".to_string(), Value::from(license_key));
    fields.insert("issued_at".to_string(), Value::from("2024-01-01T00:00:00"));
    if let Some(expires_at) = expires_at {
        fields.insert("expires_at".to_string(), Value::from(expires_at));
    }

    let message = canonical_payload(&fields).unwrap();
    let mut signer = Signer::new(MessageDigest::sha256(), issuer_key()).unwrap();
    signer.set_rsa_padding(Padding::PKCS1_PSS).unwrap();
    signer.set_rsa_mgf1_md(MessageDigest::sha256()).unwrap();
    signer
        .set_rsa_pss_saltlen(RsaPssSaltlen::MAXIMUM_LENGTH)
        .unwrap();
    signer.update(&message).unwrap();
    let signature = hex::encode(signer.sign_to_vec().unwrap());

    fields.insert("signature".to_string(), Value::from(signature));
    serde_json::to_string_pretty(&fields).unwrap()
}
