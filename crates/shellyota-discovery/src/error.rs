//! Error types for device discovery

use thiserror::Error;

/// Errors that can occur during device discovery
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The mDNS browse could not be started
    #[error("mDNS browse failed: {0}")]
    Mdns(String),

    /// The subnet scanner found nothing to scan
    #[error("no subnets to scan")]
    NoSubnets,

    /// Local network enumeration failed
    #[error(transparent)]
    Net(#[from] shellyota_net::NetError),
}
