//! Serde shapes of the device HTTP endpoints

use serde::Deserialize;

/// Response body of the Gen1 `/settings` endpoint, reduced to the fields
/// the updater consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Gen1Settings {
    /// Nested device identity block
    pub device: Gen1DeviceInfo,
    /// Raw firmware version string, e.g. `20230913-131259/v1.14.0-gcb84623`
    #[serde(default, rename = "fw")]
    pub firmware: String,
    /// User-assigned device name, often empty
    #[serde(default)]
    pub name: String,
}

/// Identity block nested in [`Gen1Settings`].
#[derive(Debug, Clone, Deserialize)]
pub struct Gen1DeviceInfo {
    /// Model code, e.g. `SHSW-25`
    #[serde(default, rename = "type")]
    pub model: String,
    /// Announced hostname, doubles as the device id on Gen1
    #[serde(default)]
    pub hostname: String,
}

/// Response body of the Gen2+ `/rpc/Shelly.GetDeviceInfo` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Gen2Settings {
    /// Device id, e.g. `shellyplus1-aabbcc`
    #[serde(default)]
    pub id: String,
    /// Model code (application name), e.g. `Plus1`
    #[serde(default, rename = "app")]
    pub model: String,
    /// Raw firmware version string, e.g. `1.4.4`
    #[serde(default, rename = "ver")]
    pub firmware: String,
    /// User-assigned device name, often empty
    #[serde(default)]
    pub name: String,
}

/// Response body of the unauthenticated `/shelly` classification probe.
///
/// Gen1 devices omit the `gen` field entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellyInfo {
    /// Device generation; absent on Gen1
    #[serde(default, rename = "gen")]
    pub generation: u8,
    /// Model code for Gen2+ devices
    #[serde(default, rename = "app")]
    pub model: String,
}
