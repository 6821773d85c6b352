//! Control-stream construction parameters.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::observer::Observer;
use crate::protocol::Protocol;
use crate::signal::{ConnectedFuse, Signal};

/// Registration metadata presented to the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelProperties {
    /// Identifier of the tunnel being registered.
    pub tunnel_id: String,
    /// Client version string reported to the edge.
    pub version: String,
}

impl Default for TunnelProperties {
    fn default() -> Self {
        Self {
            tunnel_id: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Everything a transport needs to build the control-stream handler for one
/// connection attempt.
///
/// The worker fills this per iteration; the transport constructs its handler
/// from it, fires the [`ConnectedFuse`] when registration succeeds, and
/// honors the graceful-shutdown signal within the grace period.
#[derive(Debug, Clone)]
pub struct ControlStreamRequest {
    /// Lifecycle event sink.
    pub observer: Arc<Observer>,
    /// Connected-notifier capability for this attempt.
    pub notifier: ConnectedFuse,
    /// Registration metadata.
    pub properties: TunnelProperties,
    /// Slot index of the connection.
    pub slot: u8,
    /// IP of the edge endpoint being dialed.
    pub edge_ip: IpAddr,
    /// Deadline for individual registration RPCs.
    pub rpc_timeout: Duration,
    /// Graceful-shutdown signal; serving stops cleanly when it fires.
    pub shutdown: Signal,
    /// Time allowed to unregister and drain after shutdown fires.
    pub grace_period: Duration,
    /// Protocol this attempt uses.
    pub protocol: Protocol,
    /// Attempts made since the last successful connect.
    pub previous_attempts: u8,
}
