#![warn(missing_docs)]

//! edgelink supervisor: the per-connection lifecycle machinery of the tunnel
//! agent.
//!
//! One [`Supervisor`] runs N highly-available connection slots. Each slot
//! worker loops through dial, serve, classify, wait: it takes an edge
//! address from the shared pool, serves a connection over the slot's current
//! protocol, classifies the failure (rotate the address? connectivity
//! problem?), backs off, and picks the protocol for the next attempt,
//! falling back from QUIC to HTTP/2 when the preferred transport cannot be
//! established, unless another slot has already proven it works.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod fallback;
pub mod supervisor;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod testutil;

pub use backoff::BackoffHandler;
pub use classify::{ConnectivityError, EdgeAddrHandler, IpFallbackPolicy};
pub use config::{PostQuantumMode, TunnelConfig};
pub use fallback::{select_next_protocol, ProtocolFallback};
pub use supervisor::Supervisor;
pub use tunnel::{CrashReporter, EdgeTunnelServer, NoopCrashReporter};
