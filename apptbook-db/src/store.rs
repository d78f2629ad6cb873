//! SQLite-backed [`ActivationStore`].
//!
//! Three tables: the singleton `licenses` and `device_info` rows (pinned to
//! `id = 1`) and the append-only `audit_logs`. Timestamps are ISO-8601 text.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use apptbook_license::{
    format_timestamp, parse_timestamp, ActivationStore, AuditLogEntry, DeviceFingerprint,
    LicenseRecord, LicenseResult, LicenseState,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{DbError, DbResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS licenses (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        license_key TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 0,
        machine_id_used TEXT,
        issued_at TEXT,
        expires_at TEXT,
        signature_status TEXT NOT NULL,
        last_check_date TEXT
    );

    CREATE TABLE IF NOT EXISTS device_info (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        machine_id_hash TEXT NOT NULL,
        bios_uuid TEXT NOT NULL,
        disk_serial TEXT NOT NULL,
        mac_address TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS audit_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        action_type TEXT NOT NULL,
        details TEXT NOT NULL,
        user_id INTEGER
    );

    INSERT OR IGNORE INTO licenses (id, license_key, is_active, signature_status)
    VALUES (1, 'N/A', 0, 'NeverActivated');
";

/// Licensing tables in a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        debug!("Opening license database at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ── License record ───────────────────────────────────────────

    /// Loads the singleton license row.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure or undecodable columns.
    pub fn load_license(&self) -> DbResult<Option<LicenseRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT license_key, is_active, machine_id_used, issued_at, expires_at,
                        signature_status, last_check_date
                 FROM licenses WHERE id = 1",
                [],
                RawLicense::from_row,
            )
            .optional()?;
        raw.map(RawLicense::decode).transpose()
    }

    /// Replaces the singleton license row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_license(&self, record: &LicenseRecord) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO licenses
                (id, license_key, is_active, machine_id_used, issued_at, expires_at,
                 signature_status, last_check_date)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.license_key,
                record.is_active,
                record.machine_id_used,
                record.issued_at.map(format_timestamp),
                record.expires_at.map(format_timestamp),
                record.signature_status.as_status(),
                record.last_check_date.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    // ── Device info ──────────────────────────────────────────────

    /// Loads the singleton device row.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub fn load_device(&self) -> DbResult<Option<DeviceFingerprint>> {
        let conn = self.conn()?;
        let device = conn
            .query_row(
                "SELECT machine_id_hash, bios_uuid, disk_serial, mac_address
                 FROM device_info WHERE id = 1",
                [],
                |row| {
                    Ok(DeviceFingerprint {
                        machine_id_hash: row.get(0)?,
                        bios_uuid: row.get(1)?,
                        disk_serial: row.get(2)?,
                        mac_address: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(device)
    }

    /// Replaces the singleton device row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_device(&self, device: &DeviceFingerprint) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO device_info
                (id, machine_id_hash, bios_uuid, disk_serial, mac_address)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                device.machine_id_hash,
                device.bios_uuid,
                device.disk_serial,
                device.mac_address,
            ],
        )?;
        Ok(())
    }

    // ── Audit log ────────────────────────────────────────────────

    /// Appends an audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn save_audit_entry(&self, entry: &AuditLogEntry) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_logs (timestamp, action_type, details, user_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                format_timestamp(entry.timestamp),
                entry.action_type,
                entry.details,
                entry.user_id,
            ],
        )?;
        Ok(())
    }

    /// Loads audit log entries with pagination, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure or an unparseable timestamp.
    pub fn audit_log(&self, limit: usize, offset: usize) -> DbResult<Vec<AuditLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, action_type, details, user_id
             FROM audit_logs ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (timestamp, action_type, details, user_id) = row?;
            entries.push(AuditLogEntry {
                timestamp: decode_timestamp("timestamp", &timestamp)?,
                action_type,
                details,
                user_id,
            });
        }
        Ok(entries)
    }

    /// Returns the total number of audit log entries.
    ///
    /// # Errors
    ///
    /// Returns an error on query failure.
    pub fn audit_log_len(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl ActivationStore for SqliteStore {
    fn license_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self.load_license()?)
    }

    fn upsert_license_record(&self, record: &LicenseRecord) -> LicenseResult<()> {
        Ok(self.save_license(record)?)
    }

    fn device_info(&self) -> LicenseResult<Option<DeviceFingerprint>> {
        Ok(self.load_device()?)
    }

    fn upsert_device_info(&self, device: &DeviceFingerprint) -> LicenseResult<()> {
        Ok(self.save_device(device)?)
    }

    fn append_audit_log(&self, entry: &AuditLogEntry) -> LicenseResult<()> {
        Ok(self.save_audit_entry(entry)?)
    }
}

/// License row as stored, before decoding text columns.
struct RawLicense {
    license_key: String,
    is_active: bool,
    machine_id_used: Option<String>,
    issued_at: Option<String>,
    expires_at: Option<String>,
    signature_status: String,
    last_check_date: Option<String>,
}

impl RawLicense {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            license_key: row.get(0)?,
            is_active: row.get(1)?,
            machine_id_used: row.get(2)?,
            issued_at: row.get(3)?,
            expires_at: row.get(4)?,
            signature_status: row.get(5)?,
            last_check_date: row.get(6)?,
        })
    }

    fn decode(self) -> DbResult<LicenseRecord> {
        let signature_status = self
            .signature_status
            .parse::<LicenseState>()
            .map_err(|e| DbError::InvalidData {
                column: "signature_status",
                value: e.0,
            })?;
        Ok(LicenseRecord {
            license_key: self.license_key,
            is_active: self.is_active,
            machine_id_used: self.machine_id_used,
            issued_at: decode_optional("issued_at", self.issued_at)?,
            expires_at: decode_optional("expires_at", self.expires_at)?,
            signature_status,
            last_check_date: decode_optional("last_check_date", self.last_check_date)?,
        })
    }
}

fn decode_timestamp(column: &'static str, raw: &str) -> DbResult<NaiveDateTime> {
    parse_timestamp(raw).map_err(|_| DbError::InvalidData {
        column,
        value: raw.to_string(),
    })
}

fn decode_optional(column: &'static str, raw: Option<String>) -> DbResult<Option<NaiveDateTime>> {
    raw.as_deref()
        .map(|raw| decode_timestamp(column, raw))
        .transpose()
}
