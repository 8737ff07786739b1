//! Network primitives
//!
//! Address resolution, the bound listening socket, and the per-connection
//! [`Endpoint`] observed by the transport.

pub mod listener;

pub use listener::{Listener, BACKLOG};

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve {0}")]
    Resolve(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Remote address of an accepted connection
///
/// IPv4-mapped IPv6 addresses (seen on dual-stack listeners) are reported as
/// plain IPv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Endpoint {
            address: address.to_canonical(),
            port,
        }
    }

    /// Textual address literal, as sent back to the peer
    pub fn address_literal(&self) -> String {
        self.address.to_string()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::new(self.address, self.port).fmt(f)
    }
}

/// Resolve `(host, port)` to every socket address it names
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Resolve(format!("{}:{}: {}", host, port, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Resolve(format!("{}:{}: no addresses", host, port)));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)), 30046);
        assert_eq!(ep.to_string(), "192.0.2.7:30046");
        assert_eq!(ep.address_literal(), "192.0.2.7");

        let ep = Endpoint::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 443);
        assert_eq!(ep.to_string(), "[::1]:443");
    }

    #[test]
    fn test_endpoint_unmaps_ipv4() {
        let mapped: SocketAddr = "[::ffff:203.0.113.9]:5000".parse().unwrap();
        let ep = Endpoint::from(mapped);
        assert_eq!(ep.address, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)));
        assert_eq!(ep.address_literal().len(), 11);
    }

    #[test]
    fn test_resolve_literal() {
        let addrs = resolve("127.0.0.1", 8080).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_resolve_failure() {
        assert!(matches!(resolve("no such host.invalid", 1), Err(Error::Resolve(_))));
    }
}
