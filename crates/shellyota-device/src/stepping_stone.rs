//! Mandatory 1.3.3 stepping-stone policy for Gen2+ devices
//!
//! Gen2+ devices running firmware below 1.3.3 cannot jump directly to
//! 1.4.0+; the vendor changelog lists 1.3.3 as a mandatory update before
//! 1.4.0. URLs follow `https://fwcdn.shelly.cloud/gen2/{CDNModel}/{sha256}`.
//!
//! CDN model names usually match the device app name, except for a few
//! Gen3 models where the name changed between firmware versions (i4G3 →
//! I4G3, 1G3 → S1G3, 1PMG3 → S1PMG3).
//!
//! Models not listed here either shipped with firmware >= 1.3.3 or their
//! 1.3.3 CDN hash has not been located (PlugUS, Plus10V, Plus1Mini,
//! PlusHT, PlusPlugIT, PlusPlugUK, PlusPMMini, PlusWallDimmer and the
//! Pro line). Gen4 devices shipped after 1.4.0 and never need an entry.

use tracing::warn;

use crate::device::Device;
use crate::firmware::RemoteFirmware;
use crate::version::{extract_semantic_version, is_version_less_than};

/// The mandatory intermediate version.
pub const STEPPING_STONE_VERSION: &str = "1.3.3";

/// Models with a verified 1.3.3 CDN build, with their download hashes.
const STEPPING_STONE_133: &[(&str, &str)] = &[
    (
        "Plus1",
        "https://fwcdn.shelly.cloud/gen2/Plus1/ddd5a7b49ff3e65240d1264eb531f82da2aa86d3d05d045c5226a81e7ea2e43d",
    ),
    (
        "Plus1PM",
        "https://fwcdn.shelly.cloud/gen2/Plus1PM/cc34adf8e45a3765b3f05efcd9a4322efd99c50c52ec9434fa51beb3b56217e1",
    ),
    (
        "Plus1PMMini",
        "https://fwcdn.shelly.cloud/gen2/Plus1PMMini/72efef59bf19303ab32be3bc5e303e1fdf15cf6608698a73c5e3ffdbfa17e61e",
    ),
    (
        "Plus2PM",
        "https://fwcdn.shelly.cloud/gen2/Plus2PM/eea874bcfee2b4876901948159b80bd9d2fc719300982f3ee489fa2168d400ea",
    ),
    (
        "PlusI4",
        "https://fwcdn.shelly.cloud/gen2/PlusI4/a341e6b3ab556ebfcc442311f65dc1e1c5fd01ec7e926617b8eb2589d0d00a8b",
    ),
    (
        "PlusPlugS",
        "https://fwcdn.shelly.cloud/gen2/PlusPlugS/b537c97799933584593641ea0f7ca7d3750b4020ce134d641953b92df5845220",
    ),
    (
        "Mini1G3",
        "https://fwcdn.shelly.cloud/gen2/Mini1G3/ad6a38015d22503f95e4435d9a15342b7c721f30b4caf7e93f195428aa3b3ed0",
    ),
    (
        "Mini1PMG3",
        "https://fwcdn.shelly.cloud/gen2/Mini1PMG3/ac3e0a3dcbf2809d0509b9b2335276fe76dcf51662df32a22677f64be58f4e54",
    ),
    (
        "i4G3",
        "https://fwcdn.shelly.cloud/gen2/I4G3/cff09b114d5ff6980b1f4858cf80b9d37948371f64a4b4305ba3dc82507521d7",
    ),
    (
        "1G3",
        "https://fwcdn.shelly.cloud/gen2/S1G3/0021ac4946f8406df5f99e33d2fb2e37e4a5a5152f91dbbdcf5dd62d548b407d",
    ),
    (
        "1PMG3",
        "https://fwcdn.shelly.cloud/gen2/S1PMG3/0527974777080c85f3250c99f33ea3adff7da4ee02f03609b3fc03020ded9666",
    ),
];

/// Model codes with a stepping-stone entry. Exposed for table-driven
/// tests and tooling.
pub fn stepping_stone_models() -> impl Iterator<Item = &'static str> {
    STEPPING_STONE_133.iter().map(|(model, _)| *model)
}

/// Returns the 1.3.3 stepping-stone firmware for `model`, if one is
/// known.
pub fn stepping_stone_for(model: &str) -> Option<RemoteFirmware> {
    STEPPING_STONE_133
        .iter()
        .find(|(candidate, _)| *candidate == model)
        .map(|(model, url)| RemoteFirmware {
            model: (*model).to_string(),
            version: STEPPING_STONE_VERSION.to_string(),
            url: (*url).to_string(),
            beta_version: String::new(),
            beta_url: String::new(),
        })
}

/// Checks whether a device must traverse the 1.3.3 stepping-stone before
/// it can receive a later firmware.
///
/// Returns the stepping-stone firmware when the device is Gen2+, below
/// 1.3.3 and has a known CDN build. When the device is below 1.3.3 but
/// no build is known, a warning is emitted and None is returned; the
/// condition is reported separately via [`needs_manual_upgrade`].
pub fn needs_stepping_stone(device: &Device) -> Option<RemoteFirmware> {
    if device.generation < 2 {
        return None;
    }

    let current = extract_semantic_version(&device.firmware_version);
    if !is_version_less_than(&current, STEPPING_STONE_VERSION) {
        return None;
    }

    if let Some(firmware) = stepping_stone_for(&device.model) {
        return Some(firmware);
    }

    warn!(
        "{} is running firmware {} (below {}) but no stepping-stone firmware is available \
         for model {}. Manual upgrade to {} may be required; check \
         https://shelly-api-docs.shelly.cloud for instructions.",
        device,
        device.firmware_version,
        STEPPING_STONE_VERSION,
        device.model,
        STEPPING_STONE_VERSION
    );

    None
}

/// True when a device sits below the stepping-stone threshold but no
/// stepping-stone build is available for its model, so the updater cannot
/// bring it forward on its own.
pub fn needs_manual_upgrade(device: &Device) -> bool {
    if device.generation < 2 {
        return false;
    }

    let current = extract_semantic_version(&device.firmware_version);
    if !is_version_less_than(&current, STEPPING_STONE_VERSION) {
        return false;
    }

    stepping_stone_for(&device.model).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn device(model: &str, version: &str, generation: u8) -> Device {
        Device {
            id: format!("test-{model}"),
            name: String::new(),
            model: model.to_string(),
            firmware_version: version.to_string(),
            target_firmware: None,
            generation,
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)),
            port: 80,
            username: String::new(),
            password: String::new(),
        }
    }

    #[test]
    fn plus1_below_threshold_needs_stepping_stone() {
        let fw = needs_stepping_stone(&device("Plus1", "1.0.0", 2)).expect("stepping stone");
        assert_eq!(fw.version, "1.3.3");
        assert_eq!(fw.model, "Plus1");
        assert!(fw.url.contains("fwcdn.shelly.cloud"));
    }

    #[test]
    fn at_or_above_threshold_is_ignored() {
        for version in ["1.3.3", "1.4.0", "2.0.0"] {
            assert!(needs_stepping_stone(&device("Plus1", version, 2)).is_none());
        }
    }

    #[test]
    fn gen1_is_always_ignored() {
        assert!(needs_stepping_stone(&device("SHSW-25", "1.0.0", 1)).is_none());
    }

    #[test]
    fn gen4_above_threshold_is_ignored() {
        assert!(needs_stepping_stone(&device("1G4", "1.4.0", 4)).is_none());
    }

    #[test]
    fn unknown_model_below_threshold_returns_none() {
        assert!(needs_stepping_stone(&device("UnknownModelXYZ", "1.0.0", 2)).is_none());
    }

    #[test]
    fn every_table_entry_resolves() {
        for model in stepping_stone_models() {
            let fw = needs_stepping_stone(&device(model, "1.0.0", 2)).expect("stepping stone");
            assert_eq!(fw.version, "1.3.3");
            assert_eq!(fw.model, model);
        }
    }

    #[test]
    fn cdn_urls_are_hash_addressed() {
        for model in stepping_stone_models() {
            let fw = stepping_stone_for(model).expect("entry");
            assert!(fw.url.contains("fwcdn.shelly.cloud/"));
            assert!(!fw.url.ends_with(".zip"), "CDN URLs carry no extension");
        }
    }

    #[test]
    fn mini_pm_g3_is_covered() {
        let fw = needs_stepping_stone(&device("MiniPMG3", "1.1.99", 3));
        // MiniPMG3 shipped with >= 1.3.3; only Mini1PMG3 carries an entry.
        assert!(fw.is_none());
        let fw = needs_stepping_stone(&device("Mini1PMG3", "1.1.99", 3)).expect("stepping stone");
        assert_eq!(fw.model, "Mini1PMG3");
    }

    #[test]
    fn manual_upgrade_detection() {
        let cases = [
            ("SHSW-25", "1.0.0", 1, false),
            ("UnknownModel", "1.4.0", 2, false),
            ("UnknownModel", "1.3.3", 2, false),
            ("Plus1", "1.0.0", 2, false),
            ("UnknownModel", "1.0.0", 2, true),
            ("Mini1PMG3", "1.1.99", 3, false),
        ];

        for (model, version, generation, expected) in cases {
            assert_eq!(
                needs_manual_upgrade(&device(model, version, generation)),
                expected,
                "{model} {version} gen{generation}"
            );
        }
    }
}
