//! Path resolution and report formatting for the `apptbook` binary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apptbook_license::{format_timestamp, AuditLogEntry, LicenseConfig, LicenseRecord};
use tracing_subscriber::EnvFilter;

/// Configuration file looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "apptbook.toml";

/// Default data directory: the platform data dir plus `apptbook`, or the
/// working directory if the platform has none.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("apptbook"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Log filter for the binary.
///
/// `directives` (normally `RUST_LOG`) wins when set; otherwise everything is
/// logged at `INFO`, or `DEBUG` when `verbose`.
#[must_use]
pub fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::new(
        directives
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(default),
    )
}

/// Loads the licensing configuration and anchors it in `data_dir`.
///
/// An explicit `config` path must exist. Without one, `apptbook.toml` in
/// `data_dir` is used if present, otherwise the defaults.
///
/// # Errors
///
/// Returns an error if a configuration file exists but cannot be parsed, or
/// an explicit one cannot be read.
pub fn resolve_config(data_dir: &Path, config: Option<&Path>) -> Result<LicenseConfig> {
    let loaded = match config {
        Some(path) => LicenseConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let path = data_dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                LicenseConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?
            } else {
                LicenseConfig::default()
            }
        }
    };
    Ok(loaded.with_base_dir(data_dir))
}

/// Human-readable summary of the license record.
#[must_use]
pub fn render_status(record: Option<&LicenseRecord>) -> String {
    let Some(record) = record else {
        return "Status:        NeverActivated\n".to_string();
    };
    let mut out = String::new();
    let _ = writeln!(out, "Status:        {}", record.signature_status);
    let _ = writeln!(out, "Active:        {}", if record.is_active { "yes" } else { "no" });
    let _ = writeln!(out, "License key:   {}", record.license_key);
    let _ = writeln!(
        out,
        "Machine id:    {}",
        record.machine_id_used.as_deref().unwrap_or("-")
    );
    let _ = writeln!(out, "Issued:        {}", or_dash(record.issued_at.map(format_timestamp)));
    let _ = writeln!(
        out,
        "Expires:       {}",
        record
            .expires_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    );
    let _ = writeln!(out, "Last checked:  {}", or_dash(record.last_check_date.map(format_timestamp)));
    out
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// One line per audit entry, oldest at the bottom.
#[must_use]
pub fn render_audit(entries: &[AuditLogEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "{}  {:<28} {}\n",
                format_timestamp(e.timestamp),
                e.action_type,
                e.details
            )
        })
        .collect()
}
