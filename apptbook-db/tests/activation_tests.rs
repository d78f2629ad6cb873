mod common;

use std::sync::Arc;

use apptbook_db::SqliteStore;
use apptbook_license::{
    FingerprintGenerator, Fingerprinter, LicenseConfig, LicenseManager, LicenseState,
};
use common::{install_public_key, signed_license, write_file};
use pretty_assertions::assert_eq;
use rusqlite::Connection;

fn this_machine() -> String {
    FingerprintGenerator::new().generate().device.machine_id_hash
}

fn config(dir: &std::path::Path) -> LicenseConfig {
    LicenseConfig::default().with_base_dir(dir)
}

#[test]
fn activation_persists_to_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    install_public_key(dir.path());
    write_file(
        dir.path(),
        "license.json",
        signed_license(&this_machine(), "KEY-1", Some("2099-01-01T00:00:00")),
    );

    let store = Arc::new(SqliteStore::open(&config.database_file).unwrap());
    let manager = LicenseManager::from_config(Arc::clone(&store), &config);

    assert!(manager.check_activation_status());
    assert_eq!(manager.state(), LicenseState::Active);

    let conn = Connection::open(&config.database_file).unwrap();
    let (is_active, status, key, machine): (i64, String, String, String) = conn
        .query_row(
            "SELECT is_active, signature_status, license_key, machine_id_used FROM licenses",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(is_active, 1);
    assert_eq!(status, "Valid");
    assert_eq!(key, "KEY-1");
    assert_eq!(machine, this_machine());

    let actions: Vec<String> = store
        .audit_log(10, 0)
        .unwrap()
        .into_iter()
        .map(|e| e.action_type)
        .filter(|a| a.starts_with("LICENSE_"))
        .collect();
    assert_eq!(actions, vec!["LICENSE_SUCCESS"]);
}

#[test]
fn activation_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    install_public_key(dir.path());
    let license = write_file(
        dir.path(),
        "license.json",
        signed_license(&this_machine(), "KEY-2", None),
    );

    {
        let store = SqliteStore::open(&config.database_file).unwrap();
        let manager = LicenseManager::from_config(store, &config);
        assert!(manager.check_activation_status());
    }
    std::fs::remove_file(license).unwrap();

    let store = SqliteStore::open(&config.database_file).unwrap();
    let manager = LicenseManager::from_config(store, &config);
    assert!(manager.check_activation_status());
}

#[test]
fn foreign_machine_license_is_persisted_as_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    install_public_key(dir.path());
    write_file(
        dir.path(),
        "license.json",
        signed_license(&"0".repeat(64), "KEY-3", None),
    );

    let store = Arc::new(SqliteStore::open(&config.database_file).unwrap());
    let manager = LicenseManager::from_config(Arc::clone(&store), &config);

    assert!(!manager.check_activation_status());
    let record = store.load_license().unwrap().unwrap();
    assert!(!record.is_active);
    assert_eq!(record.signature_status.as_status(), "MachineMismatch");
    assert_eq!(store.audit_log(1, 0).unwrap()[0].action_type, "LICENSE_FAILED");
}

#[test]
fn missing_public_key_is_logged_and_blocks_activation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_file(
        dir.path(),
        "license.json",
        signed_license(&this_machine(), "KEY-4", None),
    );

    let store = Arc::new(SqliteStore::open(&config.database_file).unwrap());
    let manager = LicenseManager::from_config(Arc::clone(&store), &config);

    assert!(!manager.check_activation_status());
    let actions: Vec<String> = store
        .audit_log(10, 0)
        .unwrap()
        .into_iter()
        .rev()
        .map(|e| e.action_type)
        .collect();
    assert_eq!(actions, vec!["LICENSE_ERROR", "LICENSE_FAILED"]);
    assert_eq!(manager.state().as_status(), "KeyMissing");
}

#[test]
fn machine_id_is_stored_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    install_public_key(dir.path());
    let store = Arc::new(SqliteStore::open(&config.database_file).unwrap());
    let manager = LicenseManager::from_config(Arc::clone(&store), &config);

    let first = manager.get_current_machine_id();
    let second = manager.get_current_machine_id();
    assert_eq!(first, second);
    assert_eq!(store.load_device().unwrap().unwrap().machine_id_hash, first);
}

#[test]
fn foreign_status_string_is_repaired_by_activation() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    install_public_key(dir.path());
    write_file(
        dir.path(),
        "license.json",
        signed_license(&this_machine(), "KEY-5", None),
    );

    let store = Arc::new(SqliteStore::open(&config.database_file).unwrap());
    Connection::open(&config.database_file)
        .unwrap()
        .execute(
            "UPDATE licenses SET signature_status = 'Invalid Signature' WHERE id = 1",
            [],
        )
        .unwrap();
    assert!(store.load_license().is_err());

    let manager = LicenseManager::from_config(Arc::clone(&store), &config);
    assert!(manager.check_activation_status());
    assert!(manager.check_activation_status());

    let record = store.load_license().unwrap().unwrap();
    assert!(record.is_active);
    assert_eq!(record.signature_status.as_status(), "Valid");

    let actions: Vec<String> = store
        .audit_log(10, 0)
        .unwrap()
        .into_iter()
        .rev()
        .map(|e| e.action_type)
        .filter(|a| a.starts_with("LICENSE_"))
        .collect();
    assert_eq!(actions, vec!["LICENSE_ERROR", "LICENSE_SUCCESS"]);
}
