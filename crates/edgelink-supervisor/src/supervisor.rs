//! The HA connection supervisor.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use edgelink_connection::{
    Observer, ProtocolSelector, ReconnectSignal, Signal, TunnelError, TunnelTransport,
};
use edgelink_discovery::{EdgeDialer, EdgePool};

use crate::backoff::BackoffHandler;
use crate::classify::EdgeAddrHandler;
use crate::config::TunnelConfig;
use crate::fallback::ProtocolFallback;
use crate::tunnel::{CrashReporter, EdgeTunnelServer};

/// Supervises one slot worker per HA connection: spawns them, relays the
/// first-connected signal, restarts slots whose registration was taken over
/// elsewhere, and aggregates termination.
pub struct Supervisor {
    config: Arc<TunnelConfig>,
    selector: Arc<dyn ProtocolSelector>,
    server: Arc<EdgeTunnelServer>,
    shutdown: Signal,
}

impl Supervisor {
    /// Wires a supervisor from the tunnel configuration and its external
    /// collaborators.
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
        let server = EdgeTunnelServer::new(
            Arc::clone(&config),
            pool,
            addr_handler,
            dialer,
            transport,
            Arc::clone(&selector),
            observer,
            reconnect,
            shutdown.clone(),
            reporter,
        );
        Self {
            config,
            selector,
            server: Arc::new(server),
            shutdown,
        }
    }

    /// Runs slot workers for every HA connection and waits for all of them.
    ///
    /// The first slot to register notifies `connected_signal` exactly once.
    /// The first non-cancellation error cancels the remaining workers and is
    /// returned once they finish. Graceful shutdown returns `Ok(())`; a
    /// watchdog force-cancels workers that outlive the grace period.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        connected_signal: Signal,
    ) -> Result<(), TunnelError> {
        info!(
            ha_connections = self.config.ha_connections,
            "Starting tunnel connections"
        );

        let mut workers: JoinSet<(u8, Result<(), TunnelError>)> = JoinSet::new();
        for slot in 0..self.config.ha_connections {
            self.spawn_slot(&mut workers, slot as u8, &cancel, &connected_signal);
        }

        let watchdog = {
            let shutdown = self.shutdown.clone();
            let cancel = cancel.clone();
            let grace_period = self.config.grace_period;
            tokio::spawn(async move {
                shutdown.wait().await;
                tokio::time::sleep(grace_period).await;
                warn!("Grace period expired; cancelling remaining tunnel connections");
                cancel.cancel();
            })
        };

        let mut first_error: Option<TunnelError> = None;
        let mut saw_cancelled = false;
        while let Some(joined) = workers.join_next().await {
            let (slot, result) = match joined {
                Ok(finished) => finished,
                Err(join_error) => {
                    error!("tunnel slot task failed: {join_error}");
                    continue;
                }
            };
            match result {
                Ok(()) => debug!(conn_index = slot, "Tunnel connection slot finished"),
                Err(TunnelError::Cancelled) => saw_cancelled = true,
                Err(TunnelError::DuplicateConnectionRegister)
                    if !cancel.is_cancelled() && !self.shutdown.is_notified() =>
                {
                    // The pool already rotated this slot's binding; a fresh
                    // worker picks up the replacement address.
                    warn!(
                        conn_index = slot,
                        "Connection registered elsewhere; restarting slot with a new edge address"
                    );
                    self.spawn_slot(&mut workers, slot, &cancel, &connected_signal);
                }
                Err(err) => {
                    error!(conn_index = slot, error = %err, "Tunnel connection slot failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                        cancel.cancel();
                    }
                }
            }
        }
        watchdog.abort();

        if let Some(err) = first_error {
            Err(err)
        } else if self.shutdown.is_notified() {
            Ok(())
        } else if saw_cancelled {
            Err(TunnelError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn spawn_slot(
        &self,
        workers: &mut JoinSet<(u8, Result<(), TunnelError>)>,
        slot: u8,
        cancel: &CancellationToken,
        connected_signal: &Signal,
    ) {
        let backoff = BackoffHandler::new(self.config.base_retry_interval, self.config.retries)
            .with_retry_forever(self.config.retry_forever);
        let fallback = ProtocolFallback::new(backoff, self.selector.current());
        let server = Arc::clone(&self.server);
        let cancel = cancel.clone();
        let connected_signal = connected_signal.clone();
        workers.spawn(async move {
            let result = server.serve(slot, fallback, connected_signal, cancel).await;
            (slot, result)
        });
    }
}
