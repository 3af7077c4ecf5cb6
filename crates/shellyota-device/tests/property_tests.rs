//! Property-based tests for the version algebra

use proptest::prelude::*;
use shellyota_device::{extract_semantic_version, is_version_less_than, parse_version};

fn arb_triple() -> impl Strategy<Value = (u32, u32, u32)> {
    (0u32..1000, 0u32..1000, 0u32..1000)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Extraction is idempotent on a clean MAJOR.MINOR.PATCH string.
    #[test]
    fn prop_extraction_is_idempotent_on_clean_versions((major, minor, patch) in arb_triple()) {
        let clean = format!("{major}.{minor}.{patch}");
        let extracted = extract_semantic_version(&clean);
        prop_assert_eq!(&extracted, &clean);
        prop_assert_eq!(extract_semantic_version(&extracted), clean);
    }

    /// Extraction recovers the triple from the Gen1 date/hash framing.
    #[test]
    fn prop_extraction_strips_gen1_framing((major, minor, patch) in arb_triple()) {
        let raw = format!("20230913-131259/v{major}.{minor}.{patch}-gcb84623");
        prop_assert_eq!(
            extract_semantic_version(&raw),
            format!("{major}.{minor}.{patch}")
        );
    }

    /// Strict ordering is irreflexive and antisymmetric.
    #[test]
    fn prop_less_than_is_a_strict_order(a in arb_triple(), b in arb_triple()) {
        let a_s = format!("{}.{}.{}", a.0, a.1, a.2);
        let b_s = format!("{}.{}.{}", b.0, b.1, b.2);

        prop_assert!(!is_version_less_than(&a_s, &a_s));
        prop_assert!(!(is_version_less_than(&a_s, &b_s) && is_version_less_than(&b_s, &a_s)));

        // The comparison agrees with tuple ordering.
        prop_assert_eq!(is_version_less_than(&a_s, &b_s), a < b);
    }

    /// Parsing round-trips any numeric triple.
    #[test]
    fn prop_parse_round_trips((major, minor, patch) in arb_triple()) {
        let formatted = format!("{major}.{minor}.{patch}");
        prop_assert_eq!(parse_version(&formatted), Ok((major, minor, patch)));
    }
}
