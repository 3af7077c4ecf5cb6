//! Local network utilities for the ShellyOTA updater
//!
//! Everything the updater needs to know about the host's network
//! environment lives here:
//!
//! - [`server_ip`]: the private IPv4 address devices will fetch firmware
//!   from
//! - [`server_listener`]: a TCP listener for the transient OTA server
//! - [`all_local_subnets`]: host addresses of every private /24 attached
//!   to this machine, used by the HTTP subnet scanner
//! - [`expand_cidr`]: usable host addresses of an explicitly configured
//!   subnet

#![deny(unused_must_use, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

mod error;

pub use error::NetError;

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use tokio::net::TcpListener;
use tracing::debug;

/// A specialized `Result` type for network utility operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Returns true if `ip` falls inside one of the RFC1918 private blocks
/// (10/8, 172.16/12, 192.168/16).
pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets[0] {
        10 => true,
        172 => (16..=31).contains(&octets[1]),
        192 => octets[1] == 168,
        _ => false,
    }
}

/// Returns the first private IPv4 address found on any interface.
///
/// This is the address handed to devices as the OTA download host, so it
/// must be reachable from the device subnet.
pub fn server_ip() -> Result<Ipv4Addr> {
    let interfaces = if_addrs::get_if_addrs()?;

    for interface in &interfaces {
        if let IpAddr::V4(ip) = interface.ip() {
            if is_private_ipv4(ip) {
                debug!("Selected local address {} ({})", ip, interface.name);
                return Ok(ip);
            }
        }
    }

    Err(NetError::NoPrivateAddress)
}

/// Binds a TCP listener on `0.0.0.0:port` and returns it together with
/// the selected port. A `port` of 0 lets the OS pick a free one.
pub async fn server_listener(port: u16) -> Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Enumerates every private /24 subnet attached to a non-loopback
/// interface and returns the host addresses `x.x.x.1..=x.x.x.254` of
/// each, along with the detected /24 prefixes for logging.
///
/// The /24 prefix is used as the dedup key so the same subnet is never
/// scanned twice even when multiple interfaces sit on it.
pub fn all_local_subnets() -> (Vec<Ipv4Addr>, Vec<Ipv4Net>) {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            debug!("Failed to enumerate network interfaces: {err}");
            return (Vec::new(), Vec::new());
        }
    };

    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    let mut subnets = Vec::new();

    for interface in &interfaces {
        if interface.is_loopback() {
            continue;
        }

        let IpAddr::V4(ip) = interface.ip() else {
            continue;
        };

        if !is_private_ipv4(ip) {
            continue;
        }

        let octets = ip.octets();
        let prefix = [octets[0], octets[1], octets[2]];
        if !seen.insert(prefix) {
            continue;
        }

        let network = Ipv4Addr::new(prefix[0], prefix[1], prefix[2], 0);
        if let Ok(net) = Ipv4Net::new(network, 24) {
            subnets.push(net);
        }

        for host in 1..255 {
            hosts.push(Ipv4Addr::new(prefix[0], prefix[1], prefix[2], host));
        }
    }

    (hosts, subnets)
}

/// Parses a CIDR block and returns all usable host addresses in it,
/// excluding the network and broadcast addresses.
pub fn expand_cidr(cidr: &str) -> Result<Vec<Ipv4Addr>> {
    let net: Ipv4Net = cidr
        .parse()
        .map_err(|err: ipnet::AddrParseError| NetError::InvalidCidr(cidr.to_string(), err.to_string()))?;

    Ok(net.hosts().collect())
}
