//! Device model and upgrade policy for the ShellyOTA updater
//!
//! This crate carries the value types and static knowledge shared by
//! discovery, the catalog client and the orchestrator:
//!
//! - [`device`]: the [`Device`] value type and its URL derivations
//! - [`announcement`]: what service discovery knows before settings are
//!   fetched
//! - [`settings`]: serde shapes of the device HTTP endpoints
//! - [`firmware`]: the vendor firmware descriptor and its cache identifiers
//! - [`models`]: model code tables (friendly names, update-API aliasing)
//! - [`version`]: extraction and comparison of firmware version strings
//! - [`stepping_stone`]: the mandatory 1.3.3 intermediate firmware policy

#![deny(unused_must_use, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

pub mod announcement;
pub mod device;
pub mod firmware;
pub mod models;
pub mod settings;
pub mod stepping_stone;
pub mod version;

pub use announcement::DeviceAnnouncement;
pub use device::Device;
pub use firmware::RemoteFirmware;
pub use settings::{Gen1Settings, Gen2Settings, ShellyInfo};
pub use stepping_stone::{needs_manual_upgrade, needs_stepping_stone, STEPPING_STONE_VERSION};
pub use version::{extract_semantic_version, is_version_less_than, parse_version, VersionError};
