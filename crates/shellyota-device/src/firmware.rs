//! Vendor firmware descriptors

use std::fmt;

/// A firmware build published by the vendor for a specific model.
///
/// `beta_version`/`beta_url` are empty when no beta channel build is
/// published for the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFirmware {
    /// Model code this firmware targets
    pub model: String,
    /// Stable channel version string
    pub version: String,
    /// Stable channel download URL
    pub url: String,
    /// Beta channel version string, if any
    pub beta_version: String,
    /// Beta channel download URL, if any
    pub beta_url: String,
}

impl RemoteFirmware {
    /// Cache identifier for the stable channel build.
    pub fn stable_id(&self) -> String {
        format!("{}-{}@stable", self.model, self.version)
    }

    /// Cache identifier for the beta channel build.
    pub fn beta_id(&self) -> String {
        format!("{}-{}@beta", self.model, self.beta_version)
    }
}

impl fmt::Display for RemoteFirmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.model, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_distinct() {
        let fw = RemoteFirmware {
            model: "SHSW-25".to_string(),
            version: "20200309-104051/v1.6.0@43056d58".to_string(),
            url: "https://example.com/SHSW-25.zip".to_string(),
            beta_version: "20210122-154345/v1.10.0-rc1@00eeaa9b".to_string(),
            beta_url: "https://example.com/SHSW-25-beta.zip".to_string(),
        };

        assert_eq!(fw.stable_id(), "SHSW-25-20200309-104051/v1.6.0@43056d58@stable");
        assert_eq!(fw.beta_id(), "SHSW-25-20210122-154345/v1.10.0-rc1@00eeaa9b@beta");
        assert_ne!(fw.stable_id(), fw.beta_id());
    }
}
