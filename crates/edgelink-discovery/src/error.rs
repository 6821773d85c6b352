//! Error types for edge discovery and dialing.

use std::io;

use thiserror::Error;

/// Errors from the edge address pool.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The pool has no address to hand to the requesting slot. Terminal for
    /// the slot; upper layers may abort the tunnel.
    #[error("no edge addresses left to assign")]
    NoAddressesLeft,
}

/// A failure to establish the TCP+TLS connection to an edge endpoint.
///
/// Kept distinct from other transport errors so the classifier can treat
/// "could not reach the edge" as a connectivity problem and rotate addresses.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct DialError {
    context: &'static str,
    #[source]
    source: io::Error,
}

impl DialError {
    /// Wraps an io error with a short static description of the dial stage
    /// that failed.
    pub fn new(context: &'static str, source: io::Error) -> Self {
        Self { context, source }
    }

    /// The dial stage that failed.
    pub fn context(&self) -> &'static str {
        self.context
    }
}
