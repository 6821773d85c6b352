#![warn(missing_docs)]

//! edgelink edge discovery: the pool of candidate edge endpoints and the
//! TCP+TLS dialer used to reach them.
//!
//! This crate owns the leaf pieces of the tunnel agent:
//! - The immutable [`EdgeAddr`] record describing one edge endpoint
//! - The slot-indexed [`EdgePool`] that hands addresses to connection slots
//! - The [`EdgeDialer`] seam and its production TLS implementation

pub mod addr;
pub mod dial;
pub mod error;
pub mod pool;

pub use addr::{EdgeAddr, IpFamily};
pub use dial::{EdgeDialer, EdgeStream, TlsEdgeDialer};
pub use error::{DialError, DiscoveryError};
pub use pool::EdgePool;
