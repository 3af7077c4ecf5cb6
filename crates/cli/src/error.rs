//! Error types for the shellyctl CLI

use thiserror::Error;

/// Errors raised by the CLI layer itself (everything else bubbles up
/// from the service crates through anyhow).
#[derive(Error, Debug)]
pub enum CliError {
    /// The user configuration file exists but cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
