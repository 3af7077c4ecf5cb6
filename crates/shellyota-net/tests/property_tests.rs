//! Property-based tests for CIDR expansion

use std::net::Ipv4Addr;

use proptest::prelude::*;
use shellyota_net::expand_cidr;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A /p block yields 2^(32-p) - 2 usable hosts. Prefixes shorter
    /// than /16 are skipped to keep the materialized host lists small.
    #[test]
    fn prop_host_count_matches_prefix(a in 1u8..=223, b in 0u8..=255, prefix in 16u8..=30) {
        let cidr = format!("{}.{}.0.0/{}", a, b, prefix);
        let hosts = expand_cidr(&cidr).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let expected = (1u32 << (32 - u32::from(prefix))) - 2;
        prop_assert_eq!(hosts.len() as u32, expected);
    }

    /// Network and broadcast addresses are never part of the expansion.
    #[test]
    fn prop_excludes_network_and_broadcast(prefix in 24u8..=30) {
        let cidr = format!("10.1.2.0/{}", prefix);
        let hosts = expand_cidr(&cidr).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let network = Ipv4Addr::new(10, 1, 2, 0);
        let broadcast = u32::from(network) | ((1u32 << (32 - u32::from(prefix))) - 1);
        prop_assert!(!hosts.contains(&network));
        prop_assert!(!hosts.contains(&Ipv4Addr::from(broadcast)));
    }

    /// Every expanded host stays inside the block.
    #[test]
    fn prop_hosts_are_within_block(prefix in 20u8..=30) {
        let cidr = format!("172.16.0.0/{}", prefix);
        let hosts = expand_cidr(&cidr).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let base = u32::from(Ipv4Addr::new(172, 16, 0, 0));
        let size = 1u32 << (32 - u32::from(prefix));
        for host in hosts {
            let value = u32::from(host);
            prop_assert!(value > base && value < base + size - 1);
        }
    }
}
