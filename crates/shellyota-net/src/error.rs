//! Error types for network utilities

use thiserror::Error;

/// Errors that can occur while probing the local network environment
#[derive(Error, Debug)]
pub enum NetError {
    /// No RFC1918 address was found on any interface
    #[error("no private IPv4 address found on any network interface")]
    NoPrivateAddress,

    /// A CIDR block could not be parsed
    #[error("invalid CIDR block {0:?}: {1}")]
    InvalidCidr(String, String),

    /// Binding or enumerating sockets failed
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
}
