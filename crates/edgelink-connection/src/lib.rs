#![warn(missing_docs)]

//! edgelink connection layer: the types and seams shared between the
//! per-slot connection workers and the external transports.
//!
//! This crate defines:
//! - The [`Protocol`] model and the [`ProtocolSelector`] seam
//! - The tagged [`TunnelError`] covering the whole failure taxonomy
//! - One-shot [`Signal`]s and the per-slot connected [`BooleanFuse`]
//! - The connection [`Observer`] and the shared [`ConnTracker`]
//! - QUIC transport tuning ([`QuicSettings`]) and the control-stream request
//! - The [`TunnelTransport`] seam the workers drive

pub mod control;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod quic;
pub mod reconnect;
pub mod signal;
pub mod tracker;
pub mod transport;

pub use control::{ControlStreamRequest, TunnelProperties};
pub use error::TunnelError;
pub use observer::{ConnectionEvent, Observer};
pub use protocol::{Protocol, ProtocolSelector, StaticSelector};
pub use quic::QuicSettings;
pub use reconnect::ReconnectSignal;
pub use signal::{BooleanFuse, ConnectedFuse, Signal};
pub use tracker::{ConnTracker, ConnectionStatus};
pub use transport::TunnelTransport;
