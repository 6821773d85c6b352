//! Tunnel agent configuration.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use edgelink_connection::{Protocol, QuicSettings, TunnelProperties};
use edgelink_discovery::{IpFamily, TlsEdgeDialer};

/// Post-quantum key agreement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostQuantumMode {
    /// Classical key agreement only.
    #[default]
    Disabled,
    /// Prefer post-quantum key agreement, fall back to classical.
    Preferred,
    /// Require post-quantum key agreement; transports that cannot provide it
    /// are unusable.
    Strict,
}

/// Configuration for the connection supervisor and its slots.
#[derive(Clone)]
pub struct TunnelConfig {
    /// Number of parallel highly-available connection slots (default: 4).
    pub ha_connections: usize,
    /// Per-slot ceiling on edge address rotations before the classifier
    /// escalates to a max-retries connectivity error (default: 8).
    pub max_edge_addr_retries: u8,
    /// Backoff retry ceiling before a slot considers protocol fallback
    /// (default: 5).
    pub retries: u32,
    /// Keep retrying past the ceiling instead of giving up (default: false).
    pub retry_forever: bool,
    /// Base interval for the exponential backoff (default: 1s).
    pub base_retry_interval: Duration,
    /// Time allowed for graceful shutdown (default: 30s).
    pub grace_period: Duration,
    /// Deadline for the HTTP/2 TCP+TLS dial (default: 15s).
    pub dial_timeout: Duration,
    /// Deadline for individual registration RPCs (default: 5s).
    pub rpc_timeout: Duration,
    /// Disables QUIC path-MTU discovery (default: false).
    pub disable_quic_path_mtu_discovery: bool,
    /// Connection-level QUIC flow control limit in bytes, when overridden.
    pub quic_connection_level_flow_control_limit: Option<u64>,
    /// Stream-level QUIC flow control limit in bytes, when overridden.
    pub quic_stream_level_flow_control_limit: Option<u64>,
    /// Optional local source IP for edge dials.
    pub edge_bind_addr: Option<IpAddr>,
    /// TLS client configuration per protocol.
    pub edge_tls_configs: HashMap<Protocol, Arc<rustls::ClientConfig>>,
    /// Registration metadata presented to the edge.
    pub tunnel_properties: TunnelProperties,
    /// Whether the process runs in FIPS mode.
    pub fips_enabled: bool,
    /// Post-quantum policy.
    pub post_quantum: PostQuantumMode,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ha_connections: 4,
            max_edge_addr_retries: 8,
            retries: 5,
            retry_forever: false,
            base_retry_interval: Duration::from_secs(1),
            grace_period: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(15),
            rpc_timeout: Duration::from_secs(5),
            disable_quic_path_mtu_discovery: false,
            quic_connection_level_flow_control_limit: None,
            quic_stream_level_flow_control_limit: None,
            edge_bind_addr: None,
            edge_tls_configs: HashMap::new(),
            tunnel_properties: TunnelProperties::default(),
            fips_enabled: false,
            post_quantum: PostQuantumMode::default(),
        }
    }
}

impl TunnelConfig {
    /// QUIC tuning for a dial to an address of the given family, with this
    /// configuration's overrides applied.
    pub fn quic_settings(&self, family: IpFamily) -> QuicSettings {
        QuicSettings {
            disable_path_mtu_discovery: self.disable_quic_path_mtu_discovery,
            max_connection_receive_window: self.quic_connection_level_flow_control_limit,
            max_stream_receive_window: self.quic_stream_level_flow_control_limit,
            initial_packet_size: QuicSettings::initial_packet_size_for(family),
            ..QuicSettings::default()
        }
    }

    /// Builds the TCP+TLS edge dialer from the HTTP/2 TLS configuration, when
    /// one is present.
    pub fn edge_dialer(&self, server_name: &str) -> Option<TlsEdgeDialer> {
        self.edge_tls_configs
            .get(&Protocol::Http2)
            .map(|tls| TlsEdgeDialer::new(Arc::clone(tls), server_name))
    }
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("ha_connections", &self.ha_connections)
            .field("max_edge_addr_retries", &self.max_edge_addr_retries)
            .field("retries", &self.retries)
            .field("retry_forever", &self.retry_forever)
            .field("base_retry_interval", &self.base_retry_interval)
            .field("grace_period", &self.grace_period)
            .field("dial_timeout", &self.dial_timeout)
            .field("rpc_timeout", &self.rpc_timeout)
            .field(
                "disable_quic_path_mtu_discovery",
                &self.disable_quic_path_mtu_discovery,
            )
            .field("edge_bind_addr", &self.edge_bind_addr)
            .field(
                "edge_tls_configs",
                &self.edge_tls_configs.keys().collect::<Vec<_>>(),
            )
            .field("fips_enabled", &self.fips_enabled)
            .field("post_quantum", &self.post_quantum)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.ha_connections, 4);
        assert_eq!(config.max_edge_addr_retries, 8);
        assert_eq!(config.retries, 5);
        assert!(!config.retry_forever);
        assert_eq!(config.dial_timeout, Duration::from_secs(15));
        assert_eq!(config.grace_period, Duration::from_secs(30));
        assert_eq!(config.post_quantum, PostQuantumMode::Disabled);
    }

    #[test]
    fn test_quic_settings_carry_overrides() {
        let config = TunnelConfig {
            disable_quic_path_mtu_discovery: true,
            quic_connection_level_flow_control_limit: Some(1 << 20),
            quic_stream_level_flow_control_limit: Some(1 << 18),
            ..TunnelConfig::default()
        };

        let v4 = config.quic_settings(IpFamily::V4);
        assert!(v4.disable_path_mtu_discovery);
        assert_eq!(v4.max_connection_receive_window, Some(1 << 20));
        assert_eq!(v4.max_stream_receive_window, Some(1 << 18));
        assert_eq!(v4.initial_packet_size, 1232);

        let v6 = config.quic_settings(IpFamily::V6);
        assert_eq!(v6.initial_packet_size, 1252);
    }

    #[test]
    fn test_edge_dialer_requires_tls_config() {
        let config = TunnelConfig::default();
        assert!(config.edge_dialer("edge.example.com").is_none());
    }
}
