//! Error types for the upgrade orchestrator

use thiserror::Error;

/// Errors that can occur while orchestrating upgrades
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Local network prerequisites failed (no private address, bind
    /// failure); fatal because devices could never reach the OTA server.
    #[error(transparent)]
    Net(#[from] shellyota_net::NetError),

    /// The firmware catalog could not be consulted or a download failed
    #[error(transparent)]
    Catalog(#[from] shellyota_catalog::CatalogError),

    /// Device discovery failed outright
    #[error(transparent)]
    Discovery(#[from] shellyota_discovery::DiscoveryError),

    /// Filesystem error around the download directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
