//! The transport seam the connection workers drive.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use edgelink_discovery::EdgeStream;

use crate::control::ControlStreamRequest;
use crate::error::TunnelError;
use crate::quic::QuicSettings;

/// Dials and serves tunnel connections over the concrete transports.
///
/// External collaborator: implementations own the wire protocol, the
/// datagram/session layer, and the registration RPCs. The worker owns the
/// lifecycle around each call: address selection, failure classification,
/// backoff, and protocol fallback.
///
/// Implementations must watch the cancellation token (the worker force-breaks
/// connections through it) and the request's shutdown signal (serving ends
/// cleanly, within the grace period, when it fires).
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    /// Dials the edge's UDP endpoint over QUIC and serves the connection
    /// until it ends. Dial failures surface as [`TunnelError::QuicDial`].
    async fn serve_quic(
        &self,
        settings: QuicSettings,
        addr: SocketAddr,
        bind: Option<IpAddr>,
        request: ControlStreamRequest,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError>;

    /// Serves HTTP/2 over a TLS stream the worker already dialed.
    async fn serve_http2(
        &self,
        stream: Box<dyn EdgeStream>,
        request: ControlStreamRequest,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError>;
}
