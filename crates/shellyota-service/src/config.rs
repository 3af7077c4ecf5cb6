//! Optional user configuration file
//!
//! `~/.shellyctl.yml` can carry default device credentials so they do
//! not have to be passed on every invocation:
//!
//! ```yaml
//! global:
//!   credentials:
//!     username: admin
//!     password: secret
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while reading the user configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("failed to read user config {0}: {1}")]
    Unreadable(PathBuf, std::io::Error),

    /// The file exists but is not valid YAML
    #[error("failed to parse user config {0}: {1}")]
    Invalid(PathBuf, serde_yaml::Error),
}

/// Top level of the user configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
    /// Settings applying to every device
    #[serde(default)]
    pub global: GlobalConfig,
}

/// The `global` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalConfig {
    /// Fallback device credentials
    #[serde(default)]
    pub credentials: DefaultCredentials,
}

/// Default credentials applied when no flag or netrc entry matches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultCredentials {
    /// Default username, may be empty
    #[serde(default)]
    pub username: String,
    /// Default password, may be empty
    #[serde(default)]
    pub password: String,
}

/// Default location of the user configuration file.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".shellyctl.yml"))
}

/// Loads the user configuration. A missing file is not an error; a
/// present but malformed file is.
pub fn load_user_config(path: &Path) -> Result<Option<UserConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Unreadable(path.to_path_buf(), err))?;
    let config = serde_yaml::from_str(&content)
        .map_err(|err| ConfigError::Invalid(path.to_path_buf(), err))?;

    Ok(Some(config))
}
