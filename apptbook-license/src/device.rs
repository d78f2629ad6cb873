//! Device fingerprinting for license binding.
//!
//! Generates a stable machine id that identifies this device. A license
//! artifact carries the machine id it was issued for, and activation only
//! succeeds on the device whose fingerprint matches it exactly.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stored in place of an identifier that could not be collected.
pub const UNAVAILABLE: &str = "N/A";

/// Raw identifiers collected from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Hostname.
    pub hostname: String,
    /// Primary MAC address, lowercase and colon separated.
    pub mac_address: Option<String>,
    /// Serial number of the first disk that reports one.
    pub disk_serial: Option<String>,
}

impl DeviceInfo {
    /// Collects information about the current device.
    #[must_use]
    pub fn collect() -> Self {
        Self::collect_with(&SystemProbe)
    }

    /// Collects information through the given probe.
    #[must_use]
    pub fn collect_with<P: HostProbe + ?Sized>(probe: &P) -> Self {
        Self {
            hostname: probe.hostname().unwrap_or_else(|| "unknown".to_string()),
            mac_address: probe.mac_address().as_deref().and_then(normalize_mac),
            disk_serial: probe
                .disk_serial()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Source of low-level host identifiers.
///
/// Every method is best effort: `None` means the identifier could not be
/// obtained on this platform or with the current permissions.
pub trait HostProbe: Send + Sync {
    /// Host name of the machine.
    fn hostname(&self) -> Option<String>;
    /// MAC address of the primary network interface.
    fn mac_address(&self) -> Option<String>;
    /// Serial number of a local disk.
    fn disk_serial(&self) -> Option<String>;
}

/// [`HostProbe`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn hostname(&self) -> Option<String> {
        hostname::get().ok().and_then(|h| h.into_string().ok())
    }

    fn mac_address(&self) -> Option<String> {
        get_mac_address()
    }

    fn disk_serial(&self) -> Option<String> {
        get_disk_serial()
    }
}

/// The persisted identity of this device (singleton record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    /// SHA-256 of the raw fingerprint string, 64 lowercase hex characters.
    pub machine_id_hash: String,
    /// Host-node identifier (`{hostname}-{mac digits}`).
    pub bios_uuid: String,
    /// Disk serial, or [`UNAVAILABLE`].
    pub disk_serial: String,
    /// MAC address, or [`UNAVAILABLE`].
    pub mac_address: String,
}

/// Result of a fingerprint computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// The device identity.
    pub device: DeviceFingerprint,
    /// Set when identifiers were missing and only the host name was hashed.
    pub degraded: Option<String>,
}

impl Fingerprint {
    /// Derives the fingerprint from collected host identifiers.
    ///
    /// Without a MAC address the hash falls back to the host name alone.
    /// A missing disk serial is tolerated and hashed as [`UNAVAILABLE`].
    #[must_use]
    pub fn from_info(info: &DeviceInfo) -> Self {
        match &info.mac_address {
            Some(mac) => {
                let digits: String = mac.chars().filter(|c| *c != ':').collect();
                let bios_uuid = format!("{}-{}", info.hostname, digits);
                let disk_serial = info
                    .disk_serial
                    .clone()
                    .unwrap_or_else(|| UNAVAILABLE.to_string());
                let raw = format!("{bios_uuid}|{disk_serial}|{mac}");

                Self {
                    device: DeviceFingerprint {
                        machine_id_hash: sha256_hex(&raw),
                        bios_uuid,
                        disk_serial,
                        mac_address: mac.clone(),
                    },
                    degraded: None,
                }
            }
            None => Self {
                device: DeviceFingerprint {
                    machine_id_hash: sha256_hex(&info.hostname),
                    bios_uuid: UNAVAILABLE.to_string(),
                    disk_serial: UNAVAILABLE.to_string(),
                    mac_address: UNAVAILABLE.to_string(),
                },
                degraded: Some(format!(
                    "MAC address unavailable; machine id derived from host name '{}' only",
                    info.hostname
                )),
            },
        }
    }

    /// Returns the machine id hash.
    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.device.machine_id_hash
    }

    /// Returns true if the fingerprint fell back to the host name.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Anything able to produce the current device fingerprint.
pub trait Fingerprinter: Send + Sync {
    /// Computes the fingerprint of the current device.
    fn generate(&self) -> Fingerprint;
}

/// Derives [`Fingerprint`]s from a [`HostProbe`].
#[derive(Debug, Clone, Default)]
pub struct FingerprintGenerator<P = SystemProbe> {
    probe: P,
}

impl FingerprintGenerator {
    /// Creates a generator for the current host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: HostProbe> FingerprintGenerator<P> {
    /// Creates a generator reading identifiers from `probe`.
    #[must_use]
    pub fn with_probe(probe: P) -> Self {
        Self { probe }
    }
}

impl<P: HostProbe> Fingerprinter for FingerprintGenerator<P> {
    fn generate(&self) -> Fingerprint {
        Fingerprint::from_info(&DeviceInfo::collect_with(&self.probe))
    }
}

fn sha256_hex(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Normalizes `AA-BB-CC-DD-EE-FF` / `aa:bb:cc:dd:ee:ff` into lowercase colon form.
/// All-zero and malformed addresses are rejected.
fn normalize_mac(raw: &str) -> Option<String> {
    let octets: Vec<&str> = raw.trim().split([':', '-']).collect();
    if octets.len() != 6
        || octets
            .iter()
            .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    let mac = octets.join(":").to_ascii_lowercase();
    if mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(mac)
}

/// Gets the MAC address of the primary network interface.
fn get_mac_address() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        // Physical interfaces expose a `device` link; prefer them over bridges and veths.
        let mut interfaces: Vec<(bool, String)> = std::fs::read_dir("/sys/class/net")
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let physical = entry.path().join("device").exists();
                (!physical, name)
            })
            .filter(|(_, name)| name != "lo")
            .collect();
        interfaces.sort();

        interfaces.iter().find_map(|(_, name)| {
            std::fs::read_to_string(format!("/sys/class/net/{name}/address"))
                .ok()
                .and_then(|addr| normalize_mac(&addr))
        })
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ifconfig")
            .arg("en0")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .map(str::trim)
                    .find_map(|l| l.strip_prefix("ether "))
                    .and_then(normalize_mac)
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("getmac")
            .args(["/fo", "csv", "/nh"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output.lines().find_map(|l| {
                    l.split(',')
                        .next()
                        .map(|field| field.trim_matches('"'))
                        .and_then(normalize_mac)
                })
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

/// Gets the serial number of the first disk that reports one.
fn get_disk_serial() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let mut disks: Vec<String> = std::fs::read_dir("/sys/block")
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with("loop") && !name.starts_with("ram"))
            .collect();
        disks.sort();

        disks.iter().find_map(|name| {
            std::fs::read_to_string(format!("/sys/block/{name}/device/serial"))
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("wmic")
            .args(["diskdrive", "get", "serialnumber"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .skip(1)
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
