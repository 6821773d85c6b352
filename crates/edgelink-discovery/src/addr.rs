//! Edge endpoint records.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// IP family of an edge endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    /// IPv4 path.
    V4,
    /// IPv6 path.
    V6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "4"),
            IpFamily::V6 => write!(f, "6"),
        }
    }
}

/// A single edge endpoint: the TCP address used for HTTP/2 connections, the
/// UDP address used for QUIC connections, and the region it belongs to.
///
/// Immutable once placed into the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeAddr {
    /// TCP endpoint for HTTP/2 dials.
    pub tcp: SocketAddr,
    /// UDP endpoint for QUIC dials.
    pub udp: SocketAddr,
    /// Region identifier this endpoint was discovered in.
    pub region: String,
    /// IP family of the endpoint addresses.
    pub family: IpFamily,
}

impl EdgeAddr {
    /// Creates an edge address; the IP family is derived from the UDP endpoint.
    pub fn new(tcp: SocketAddr, udp: SocketAddr, region: impl Into<String>) -> Self {
        let family = if udp.is_ipv4() {
            IpFamily::V4
        } else {
            IpFamily::V6
        };
        Self {
            tcp,
            udp,
            region: region.into(),
            family,
        }
    }
}

impl fmt::Display for EdgeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.udp, self.region)
    }
}
