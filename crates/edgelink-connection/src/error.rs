//! The tagged error shared by the connection workers and their supervisor.

use thiserror::Error;

use edgelink_discovery::{DialError, DiscoveryError};

use crate::reconnect::ReconnectSignal;

/// Everything that can go wrong while establishing or serving a tunnel
/// connection, as a tagged variant so classification and retry decisions
/// read the tag instead of downcasting concrete types.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The edge address pool could not supply an address. Terminal for the
    /// slot.
    #[error(transparent)]
    Pool(#[from] DiscoveryError),

    /// The TCP+TLS dial to the edge failed.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// The QUIC dial to the edge failed. `crypto` marks a crypto-level
    /// handshake failure, which feeds the crash-reporter triple.
    #[error("failed to dial a quic connection to the edge: {reason}")]
    QuicDial {
        /// Human-readable dial failure description.
        reason: String,
        /// Whether the failure was a crypto-level handshake error.
        crypto: bool,
    },

    /// The transport hit its idle timeout; the peer or the path went silent.
    #[error("transport idle timeout")]
    IdleTimeout,

    /// Any other transport-layer error, described by its message.
    #[error("transport error: {reason}")]
    Transport {
        /// Transport-level failure description.
        reason: String,
    },

    /// The edge rejected the registration because this slot index is already
    /// registered elsewhere.
    #[error("connection with this index is already registered with the edge")]
    DuplicateConnectionRegister,

    /// The edge rejected the registration for a server-side reason.
    #[error("server rejected the tunnel registration: {message}")]
    ServerRegister {
        /// The server's rejection message.
        message: String,
        /// Whether the server marked the rejection permanent.
        permanent: bool,
    },

    /// An out-of-band reconnect request ended the serve.
    #[error("restarting connection: {0}")]
    Reconnect(ReconnectSignal),

    /// A failure no amount of retrying will fix.
    #[error("unrecoverable: {reason}")]
    Unrecoverable {
        /// Why the slot cannot continue.
        reason: String,
    },

    /// The parent context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A panic escaped the serve body and was captured.
    #[error("panic while serving tunnel connection: {reason}")]
    Panic {
        /// The panic payload, rendered.
        reason: String,
        /// Stack trace captured at the recovery site.
        backtrace: String,
    },
}

impl TunnelError {
    /// Whether this failure indicates the environment is dropping outbound
    /// UDP on the QUIC path: either an idle timeout, or a transport error
    /// whose text carries the kernel's "operation not permitted".
    ///
    /// The substring match is deliberate; structured errno matching would be
    /// more robust, but the transport reports the text form.
    pub fn is_quic_broken(&self) -> bool {
        match self {
            TunnelError::IdleTimeout => true,
            TunnelError::Transport { reason } => reason.contains("operation not permitted"),
            _ => false,
        }
    }
}
