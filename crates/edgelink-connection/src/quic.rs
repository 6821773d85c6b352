//! QUIC transport tuning.

use std::time::Duration;

use edgelink_discovery::IpFamily;

/// Tuning handed to the QUIC transport for each dial.
///
/// The initial packet size stays under 1280 bytes so the handshake survives
/// constrained-MTU links such as overlay VPNs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicSettings {
    /// How long an unanswered handshake may idle before failing (default: 10s).
    pub handshake_idle_timeout: Duration,
    /// Idle timeout on the established connection (default: 5s).
    pub max_idle_timeout: Duration,
    /// Keep-alive ping period (default: 1s).
    pub keep_alive_period: Duration,
    /// Cap on concurrent incoming streams (default: 1024).
    pub max_incoming_streams: u64,
    /// Whether QUIC datagram support is negotiated (default: true).
    pub enable_datagrams: bool,
    /// Disables path-MTU discovery when the environment mishandles it.
    pub disable_path_mtu_discovery: bool,
    /// Connection-level flow control limit in bytes, when overridden.
    pub max_connection_receive_window: Option<u64>,
    /// Stream-level flow control limit in bytes, when overridden.
    pub max_stream_receive_window: Option<u64>,
    /// First-flight packet size; see [`QuicSettings::initial_packet_size_for`].
    pub initial_packet_size: u16,
}

impl QuicSettings {
    /// Packet size for the first flight: 1232 bytes on IPv4 paths, 1252
    /// otherwise, keeping the handshake under a ~1280-byte path MTU.
    pub fn initial_packet_size_for(family: IpFamily) -> u16 {
        match family {
            IpFamily::V4 => 1232,
            IpFamily::V6 => 1252,
        }
    }
}

impl Default for QuicSettings {
    fn default() -> Self {
        Self {
            handshake_idle_timeout: Duration::from_secs(10),
            max_idle_timeout: Duration::from_secs(5),
            keep_alive_period: Duration::from_secs(1),
            max_incoming_streams: 1024,
            enable_datagrams: true,
            disable_path_mtu_discovery: false,
            max_connection_receive_window: None,
            max_stream_receive_window: None,
            initial_packet_size: Self::initial_packet_size_for(IpFamily::V6),
        }
    }
}
