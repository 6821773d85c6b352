//! Shared fixtures for supervisor tests: scripted transports, a mock edge
//! dialer, and a wired-up harness.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use edgelink_connection::{
    ConnTracker, ControlStreamRequest, Observer, Protocol, QuicSettings, ReconnectSignal, Signal,
    StaticSelector, TunnelError, TunnelTransport,
};
use edgelink_discovery::{DialError, EdgeAddr, EdgeDialer, EdgePool, EdgeStream};

use crate::classify::IpFallbackPolicy;
use crate::config::TunnelConfig;
use crate::supervisor::Supervisor;
use crate::tunnel::CrashReporter;

pub(crate) type MakeError = fn() -> TunnelError;

/// What a scripted serve attempt does.
#[derive(Clone, Copy)]
pub(crate) enum ServeOutcome {
    /// Fail with the constructed error.
    Fail(MakeError),
    /// Panic inside the serve body.
    Panic,
    /// Fire the connected notifier and serve until cancellation or shutdown.
    Connect,
}

/// Transport whose behavior is scripted per slot; unscripted attempts
/// connect and serve until cancelled or shut down.
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<u8, VecDeque<ServeOutcome>>>,
    attempts: Mutex<Vec<(u8, Protocol)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn script(&self, slot: u8, outcomes: Vec<ServeOutcome>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(slot, VecDeque::from(outcomes));
    }

    pub(crate) fn attempts_for(&self, slot: u8) -> Vec<Protocol> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, protocol)| *protocol)
            .collect()
    }

    async fn run(
        &self,
        protocol: Protocol,
        request: ControlStreamRequest,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        self.attempts.lock().unwrap().push((request.slot, protocol));
        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.slot)
            .and_then(|queue| queue.pop_front());
        match outcome {
            Some(ServeOutcome::Fail(make_error)) => Err(make_error()),
            Some(ServeOutcome::Panic) => panic!("scripted serve panic"),
            Some(ServeOutcome::Connect) | None => {
                request.notifier.connected();
                tokio::select! {
                    _ = cancel.cancelled() => Err(TunnelError::Cancelled),
                    _ = request.shutdown.wait() => Ok(()),
                }
            }
        }
    }
}

#[async_trait]
impl TunnelTransport for ScriptedTransport {
    async fn serve_quic(
        &self,
        _settings: QuicSettings,
        _addr: SocketAddr,
        _bind: Option<IpAddr>,
        request: ControlStreamRequest,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        self.run(Protocol::Quic, request, cancel).await
    }

    async fn serve_http2(
        &self,
        _stream: Box<dyn EdgeStream>,
        request: ControlStreamRequest,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        self.run(Protocol::Http2, request, cancel).await
    }
}

/// Edge dialer producing in-memory streams, or refusing when told to fail.
#[derive(Default)]
pub(crate) struct MockDialer {
    pub(crate) fail: AtomicBool,
}

#[async_trait]
impl EdgeDialer for MockDialer {
    async fn dial_edge(
        &self,
        _timeout: Duration,
        _addr: SocketAddr,
        _bind: Option<IpAddr>,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn EdgeStream>, DialError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(DialError::new(
                "TCP connect to edge failed",
                io::ErrorKind::ConnectionRefused.into(),
            ));
        }
        let (near, _far) = tokio::io::duplex(64);
        Ok(Box::new(near))
    }
}

/// Crash reporter that counts captures.
#[derive(Debug, Default)]
pub(crate) struct CountingReporter {
    pub(crate) captured: AtomicUsize,
}

impl CrashReporter for CountingReporter {
    fn capture(&self, _error: &TunnelError) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) fn edge_addr(n: u8) -> EdgeAddr {
    let sock: SocketAddr = format!("198.51.100.{n}:7844").parse().unwrap();
    EdgeAddr::new(sock, sock, "test")
}

pub(crate) fn quic_selector() -> StaticSelector {
    StaticSelector::new(Protocol::Quic, Some(Protocol::Http2))
}

/// Millisecond-scale configuration for a single slot.
pub(crate) fn test_config() -> TunnelConfig {
    TunnelConfig {
        ha_connections: 1,
        max_edge_addr_retries: 8,
        retries: 8,
        base_retry_interval: Duration::from_millis(1),
        grace_period: Duration::from_secs(5),
        dial_timeout: Duration::from_secs(1),
        ..TunnelConfig::default()
    }
}

pub(crate) struct Harness {
    pub(crate) supervisor: Supervisor,
    pub(crate) transport: Arc<ScriptedTransport>,
    pub(crate) dialer: Arc<MockDialer>,
    pub(crate) pool: Arc<EdgePool>,
    pub(crate) tracker: Arc<ConnTracker>,
    pub(crate) connected: Signal,
    pub(crate) shutdown: Signal,
    pub(crate) cancel: CancellationToken,
    pub(crate) reconnect_tx: mpsc::Sender<ReconnectSignal>,
    pub(crate) reporter: Arc<CountingReporter>,
}

pub(crate) fn harness(
    addrs: Vec<EdgeAddr>,
    config: TunnelConfig,
    selector: StaticSelector,
) -> Harness {
    let addr_handler = Arc::new(IpFallbackPolicy::new(config.max_edge_addr_retries));
    let config = Arc::new(config);
    let pool = Arc::new(EdgePool::new(addrs));
    let tracker = Arc::new(ConnTracker::new());
    let observer = Arc::new(Observer::new(Arc::clone(&tracker)));
    let transport = ScriptedTransport::new();
    let dialer = Arc::new(MockDialer::default());
    let reporter = Arc::new(CountingReporter::default());
    let shutdown = Signal::new();
    let (reconnect_tx, reconnect_rx) = mpsc::channel(4);

    let supervisor = Supervisor::new(
        Arc::clone(&config),
        Arc::clone(&pool),
        addr_handler,
        Arc::clone(&dialer) as Arc<dyn EdgeDialer>,
        Arc::clone(&transport) as Arc<dyn TunnelTransport>,
        Arc::new(selector),
        observer,
        reconnect_rx,
        shutdown.clone(),
        Arc::clone(&reporter) as Arc<dyn CrashReporter>,
    );

    Harness {
        supervisor,
        transport,
        dialer,
        pool,
        tracker,
        connected: Signal::new(),
        shutdown,
        cancel: CancellationToken::new(),
        reconnect_tx,
        reporter,
    }
}

/// Polls the predicate until it holds, panicking after five seconds.
pub(crate) async fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if Instant::now() > deadline {
            panic!("condition not reached within 5s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
