//! Error types for the firmware catalog client

use thiserror::Error;

/// Errors that can occur while talking to the vendor catalog endpoints
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The Gen1 catalog (or a Gen2+ fan-out request) could not be reached
    /// at transport level; every later step depends on the catalog, so
    /// callers treat this as fatal.
    #[error("firmware catalog unavailable: {0}")]
    Unavailable(String),

    /// No catalog entry exists for the requested model
    #[error("remote firmware for model {0} not found")]
    FirmwareNotFound(String),

    /// A firmware artifact could not be downloaded
    #[error("failed to download firmware from {url}: {reason}")]
    DownloadFailed {
        /// Download URL that failed
        url: String,
        /// HTTP status or I/O failure description
        reason: String,
    },

    /// Writing the artifact to the download directory failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
