//! Transport protocol model and the selector seam.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport protocol used for an edge connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// QUIC over the edge address's UDP endpoint. The preferred transport.
    Quic,
    /// HTTP/2 over TLS on the edge address's TCP endpoint.
    Http2,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Quic => write!(f, "quic"),
            Protocol::Http2 => write!(f, "http2"),
        }
    }
}

/// Chooses the top-level transport protocol and its fallback.
///
/// The core only observes the selector; out-of-band configuration updates
/// happen behind the implementation.
pub trait ProtocolSelector: Send + Sync {
    /// The currently selected protocol.
    fn current(&self) -> Protocol;
    /// The fallback protocol, when one is configured.
    fn fallback(&self) -> Option<Protocol>;
}

/// Selector with a fixed current/fallback pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticSelector {
    current: Protocol,
    fallback: Option<Protocol>,
}

impl StaticSelector {
    /// Creates a selector that always reports the given pair.
    pub fn new(current: Protocol, fallback: Option<Protocol>) -> Self {
        Self { current, fallback }
    }
}

impl ProtocolSelector for StaticSelector {
    fn current(&self) -> Protocol {
        self.current
    }

    fn fallback(&self) -> Option<Protocol> {
        self.fallback
    }
}
