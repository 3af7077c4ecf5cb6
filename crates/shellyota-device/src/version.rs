//! Extraction and comparison of firmware version strings
//!
//! Gen1 devices report versions like `20230913-131259/v1.14.0-gcb84623`
//! (build date, `v`-prefixed semver, git hash); Gen2+ devices report a
//! clean `1.4.4`. All upgrade decisions reduce those to a
//! `MAJOR.MINOR.PATCH` triple first.

use thiserror::Error;

/// Errors produced when parsing a version triple
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string is not exactly three decimal components
    #[error("invalid version format: {0:?}")]
    Invalid(String),
}

/// Extracts the `MAJOR.MINOR.PATCH` portion from a raw firmware string.
///
/// Strips everything up to and including the first `v` (if present) and
/// truncates at the first `-`, `@`, `+` or whitespace. Returns an empty
/// string when no valid triple can be extracted.
pub fn extract_semantic_version(raw: &str) -> String {
    let rest = match raw.find('v') {
        Some(index) => &raw[index + 1..],
        None => raw,
    };

    let end = rest
        .find(|c: char| c == '-' || c == '@' || c == '+' || c.is_whitespace())
        .unwrap_or(rest.len());
    let candidate = &rest[..end];

    if parse_version(candidate).is_ok() {
        candidate.to_string()
    } else {
        String::new()
    }
}

/// Parses a `MAJOR.MINOR.PATCH` string into its numeric components.
pub fn parse_version(version: &str) -> Result<(u32, u32, u32), VersionError> {
    let mut parts = version.split('.');

    let invalid = || VersionError::Invalid(version.to_string());

    let major = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let minor = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let patch = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;

    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok((major, minor, patch))
}

/// Returns true if version `a` is strictly less than version `b`.
///
/// Returns false when either side fails to parse, so malformed versions
/// never trigger an upgrade.
pub fn is_version_less_than(a: &str, b: &str) -> bool {
    match (parse_version(a), parse_version(b)) {
        (Ok(a), Ok(b)) => a < b,
        _ => false,
    }
}
