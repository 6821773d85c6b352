//! The per-slot connection worker.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use edgelink_connection::{
    BooleanFuse, ConnTracker, ConnectedFuse, ControlStreamRequest, Observer, Protocol,
    ProtocolSelector, ReconnectSignal, Signal, TunnelError, TunnelTransport,
};
use edgelink_discovery::{EdgeAddr, EdgeDialer, EdgePool};

use crate::classify::EdgeAddrHandler;
use crate::config::{PostQuantumMode, TunnelConfig};
use crate::fallback::{select_next_protocol, ProtocolFallback};

/// Receives errors worth a crash report. The worker forwards exactly one
/// shape of failure: a crypto-level QUIC dial error while running in FIPS
/// mode with post-quantum strict.
pub trait CrashReporter: Send + Sync {
    /// Records the error with the crash reporting backend.
    fn capture(&self, error: &TunnelError);
}

/// Crash reporter that drops everything.
#[derive(Debug, Default)]
pub struct NoopCrashReporter;

impl CrashReporter for NoopCrashReporter {
    fn capture(&self, _error: &TunnelError) {}
}

pub(crate) type SharedReconnectRx = Arc<AsyncMutex<mpsc::Receiver<ReconnectSignal>>>;

/// Serves tunnel connections for individual slots: one `serve` call runs one
/// slot's dial/serve/classify/wait loop until the slot is terminal.
pub struct EdgeTunnelServer {
    config: Arc<TunnelConfig>,
    pool: Arc<EdgePool>,
    addr_handler: Arc<dyn EdgeAddrHandler>,
    dialer: Arc<dyn EdgeDialer>,
    transport: Arc<dyn TunnelTransport>,
    selector: Arc<dyn ProtocolSelector>,
    observer: Arc<Observer>,
    tracker: Arc<ConnTracker>,
    reconnect: SharedReconnectRx,
    shutdown: Signal,
    reporter: Arc<dyn CrashReporter>,
}

impl EdgeTunnelServer {
    /// Wires a tunnel server from its collaborators. The reconnect receiver
    /// is shared across slots; whichever serving slot is listening when a
    /// signal arrives handles it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<TunnelConfig>,
        pool: Arc<EdgePool>,
        addr_handler: Arc<dyn EdgeAddrHandler>,
        dialer: Arc<dyn EdgeDialer>,
        transport: Arc<dyn TunnelTransport>,
        selector: Arc<dyn ProtocolSelector>,
        observer: Arc<Observer>,
        reconnect: mpsc::Receiver<ReconnectSignal>,
        shutdown: Signal,
        reporter: Arc<dyn CrashReporter>,
    ) -> Self {
        let tracker = Arc::clone(observer.tracker());
        Self {
            config,
            pool,
            addr_handler,
            dialer,
            transport,
            selector,
            observer,
            tracker,
            reconnect: Arc::new(AsyncMutex::new(reconnect)),
            shutdown,
            reporter,
        }
    }

    /// Runs one slot until it is terminal.
    ///
    /// Returns `Ok(())` on graceful shutdown or a clean serve end, and the
    /// last error when the slot gives up: address exhaustion, a terminal
    /// failure, or the retry ceiling with no fallback left.
    pub async fn serve(
        &self,
        slot: u8,
        mut fallback: ProtocolFallback,
        connected_signal: Signal,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        loop {
            let addr = self.pool.get_addr(slot as usize)?;
            let protocol = fallback.protocol();

            let fuse = BooleanFuse::new();
            self.spawn_connected_watcher(slot, protocol, fuse.clone(), connected_signal.clone());

            debug!(conn_index = slot, addr = %addr, %protocol, "Starting tunnel connection");
            let (result, recoverable) = self
                .serve_tunnel(slot, &addr, protocol, &fuse, fallback.retries(), &cancel)
                .await;
            // Release the watcher if this attempt never connected.
            fuse.fuse(false);

            if fuse.value() == Some(true) {
                // Successful connect: the retry and rotation budgets start fresh.
                fallback.reset();
                self.addr_handler.reset(slot);
            }

            let err = match result {
                Ok(()) => return Ok(()),
                Err(TunnelError::Cancelled) => return Err(TunnelError::Cancelled),
                Err(err) => err,
            };

            // Address-level reaction: rotate if the address is suspect.
            let (rotate, connectivity) = self.addr_handler.should_get_new_address(slot, Some(&err));
            if rotate {
                self.pool.get_different_addr(slot as usize, true)?;
            }

            // Fallback goes on the table when the failure is retryable, when
            // the retry ceiling is hit, or when rotating addresses has
            // stopped helping. The protocol picker applies its own criteria;
            // the address-rotation budget never gates it.
            let rotation_exhausted = connectivity.is_some_and(|c| c.has_reached_max_retries());
            let consider_fallback =
                recoverable || fallback.reached_max_retries() || rotation_exhausted;

            let (duration, more) = fallback.current_backoff();
            if !more {
                return Err(err);
            }
            self.observer.send_reconnect(slot);
            info!(conn_index = slot, "Retrying connection in up to {duration:?}");

            let Some(wait) = fallback.backoff_timer() else {
                return Err(err);
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
                _ = self.shutdown.wait() => return Ok(()),
                _ = tokio::time::sleep(wait) => {}
            }

            if is_terminal(&err) {
                return Err(err);
            }

            if consider_fallback {
                if self.tracker.has_connected_with(self.selector.current()) {
                    // The preferred protocol has been proven to work;
                    // local bad luck does not justify a downgrade.
                    continue;
                }
                if !select_next_protocol(slot, &mut fallback, self.selector.as_ref(), &err) {
                    return Err(err);
                }
            } else if !fallback.in_fallback() {
                fallback.align_current(self.selector.as_ref(), slot);
            }
        }
    }

    fn spawn_connected_watcher(
        &self,
        slot: u8,
        protocol: Protocol,
        fuse: BooleanFuse,
        connected_signal: Signal,
    ) {
        let observer = Arc::clone(&self.observer);
        tokio::spawn(async move {
            if fuse.wait().await {
                connected_signal.notify();
                observer.send_connected(slot, protocol);
            }
        });
    }

    /// Runs one dial+serve attempt. Panics become recoverable errors with a
    /// captured stack trace; the returned flag is whether the failure leaves
    /// protocol fallback on the table.
    async fn serve_tunnel(
        &self,
        slot: u8,
        addr: &EdgeAddr,
        protocol: Protocol,
        fuse: &BooleanFuse,
        previous_attempts: u32,
        cancel: &CancellationToken,
    ) -> (Result<(), TunnelError>, bool) {
        let outcome =
            AssertUnwindSafe(self.serve_connection(slot, addr, protocol, fuse, previous_attempts, cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(TunnelError::Panic {
                        reason: panic_reason(panic),
                        backtrace: Backtrace::force_capture().to_string(),
                    })
                });
        self.observer.send_disconnect(slot);

        let err = match outcome {
            Ok(()) => return (Ok(()), false),
            Err(err) => err,
        };
        match err {
            TunnelError::DuplicateConnectionRegister => {
                error!(conn_index = slot, error = %err, "Unable to establish connection");
                // The supervisor respawns the slot onto a fresh address.
                (Err(err), false)
            }
            TunnelError::ServerRegister { permanent, .. } => {
                error!(conn_index = slot, error = %err, "Registration error from the server side");
                let retryable = !permanent;
                (Err(err), retryable)
            }
            TunnelError::QuicDial { .. } => {
                error!(conn_index = slot, error = %err, "Failed to dial a quic connection");
                self.report_crypto_failure(&err);
                (Err(err), false)
            }
            TunnelError::Reconnect(signal) => {
                info!(conn_index = slot, ip = %addr.udp.ip(), "Restarting connection: {signal}");
                signal.delay_before_reconnect().await;
                (Err(TunnelError::Reconnect(signal)), true)
            }
            TunnelError::Cancelled => {
                debug!(conn_index = slot, "Serve tunnel cancelled");
                (Err(TunnelError::Cancelled), false)
            }
            TunnelError::Unrecoverable { .. } => {
                error!(conn_index = slot, error = %err, "Serve tunnel error");
                (Err(err), false)
            }
            other => {
                error!(conn_index = slot, error = %other, "Serve tunnel error");
                (Err(other), true)
            }
        }
    }

    async fn serve_connection(
        &self,
        slot: u8,
        addr: &EdgeAddr,
        protocol: Protocol,
        fuse: &BooleanFuse,
        previous_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<(), TunnelError> {
        let request = ControlStreamRequest {
            observer: Arc::clone(&self.observer),
            notifier: ConnectedFuse::new(fuse.clone()),
            properties: self.config.tunnel_properties.clone(),
            slot,
            edge_ip: addr.udp.ip(),
            rpc_timeout: self.config.rpc_timeout,
            shutdown: self.shutdown.clone(),
            grace_period: self.config.grace_period,
            protocol,
            previous_attempts: previous_attempts.min(u8::MAX as u32) as u8,
        };

        // The child token lets the reconnect listener force-break the
        // connection without touching the parent.
        let child = cancel.child_token();
        match protocol {
            Protocol::Quic => {
                let settings = self.config.quic_settings(addr.family);
                debug!(conn_index = slot, ?settings, "Tunnel connection options");
                let serve = self.transport.serve_quic(
                    settings,
                    addr.udp,
                    self.config.edge_bind_addr,
                    request,
                    child.clone(),
                );
                self.race_reconnect(serve, &child).await
            }
            Protocol::Http2 => {
                if self.config.post_quantum == PostQuantumMode::Strict {
                    return Err(TunnelError::Unrecoverable {
                        reason: "HTTP/2 transport does not support post-quantum".to_string(),
                    });
                }
                let stream = self
                    .dialer
                    .dial_edge(
                        self.config.dial_timeout,
                        addr.tcp,
                        self.config.edge_bind_addr,
                        cancel,
                    )
                    .await?;
                debug!(conn_index = slot, "Connecting via http2");
                let serve = self.transport.serve_http2(stream, request, child.clone());
                self.race_reconnect(serve, &child).await
            }
        }
    }

    async fn race_reconnect<F>(&self, serve: F, child: &CancellationToken) -> Result<(), TunnelError>
    where
        F: Future<Output = Result<(), TunnelError>>,
    {
        tokio::select! {
            result = serve => result,
            signal = self.recv_reconnect() => {
                // Force-break the connection; the slot re-dials after the
                // carried delay.
                debug!("Forcefully breaking tunnel connection");
                child.cancel();
                Err(TunnelError::Reconnect(signal))
            }
        }
    }

    async fn recv_reconnect(&self) -> ReconnectSignal {
        let mut rx = self.reconnect.lock().await;
        match rx.recv().await {
            Some(signal) => signal,
            // Sender gone: nothing will ever ask for a reconnect.
            None => std::future::pending().await,
        }
    }

    fn report_crypto_failure(&self, error: &TunnelError) {
        if let TunnelError::QuicDial { crypto: true, .. } = error {
            if self.config.fips_enabled && self.config.post_quantum == PostQuantumMode::Strict {
                self.reporter.capture(error);
            }
        }
    }
}

fn is_terminal(error: &TunnelError) -> bool {
    matches!(
        error,
        TunnelError::DuplicateConnectionRegister
            | TunnelError::Unrecoverable { .. }
            | TunnelError::ServerRegister {
                permanent: true,
                ..
            }
    )
}

fn panic_reason(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
