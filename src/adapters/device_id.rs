//! Device identity resolution.
//!
//! The thing name is normally provisioned (build-time `OTA_THING_NAME`).
//! Without one, a stable name is derived from the factory MAC address in
//! the form `ota-xxyyzz` (last 3 bytes, lowercase hex), so every board
//! still gets its own topic namespace.

use core::fmt::Write;

use crate::config::MAX_THING_NAME_LEN;
use crate::error::IdentityError;
use crate::identity::DeviceIdentity;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// `ota-xxyyzz` from the last 3 MAC bytes.
pub fn default_thing_name(mac: &MacAddress) -> heapless::String<MAX_THING_NAME_LEN> {
    let mut name = heapless::String::new();
    let _ = write!(name, "ota-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// Use the provisioned name if there is one, else the MAC-derived name.
/// A provisioned name that is present but invalid is an error, not a
/// silent fallback.
pub fn resolve_identity(
    provisioned: Option<&str>,
    mac: &MacAddress,
) -> Result<DeviceIdentity, IdentityError> {
    match provisioned {
        Some(name) if !name.is_empty() => DeviceIdentity::new(name),
        _ => DeviceIdentity::new(&default_thing_name(mac)),
    }
}
