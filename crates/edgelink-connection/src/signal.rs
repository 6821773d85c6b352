//! One-shot signals and latches used across the connection lifecycle.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// A clonable one-shot signal. The first [`notify`](Signal::notify) wakes
/// every waiter; later calls are no-ops. Used for the first-connected signal
/// and the graceful-shutdown channel.
#[derive(Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    /// Creates an unsignalled signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the signal. Idempotent.
    pub fn notify(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_notified(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|signalled| *signalled).await;
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("notified", &self.is_notified())
            .finish()
    }
}

/// A one-shot boolean latch: unset until the first [`fuse`](BooleanFuse::fuse)
/// call, which wins permanently. Waiters observe the fused value.
///
/// Each slot owns one per connection attempt; the control stream fuses it
/// true on a successful registration, and the worker fuses it false on every
/// other exit path to release the watcher.
#[derive(Clone)]
pub struct BooleanFuse {
    tx: Arc<watch::Sender<Option<bool>>>,
}

impl BooleanFuse {
    /// Creates an unset fuse.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the fuse. Only the first call has any effect.
    pub fn fuse(&self, value: bool) {
        self.tx.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(value);
                true
            } else {
                false
            }
        });
    }

    /// The fused value, or `None` while unset.
    pub fn value(&self) -> Option<bool> {
        *self.tx.borrow()
    }

    /// Waits until the fuse is set and returns the fused value.
    pub async fn wait(&self) -> bool {
        let mut rx = self.tx.subscribe();
        let result = match rx.wait_for(|value| value.is_some()).await {
            Ok(value) => (*value).unwrap_or(false),
            Err(_) => false,
        };
        result
    }
}

impl Default for BooleanFuse {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BooleanFuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BooleanFuse")
            .field("value", &self.value())
            .finish()
    }
}

/// The narrow connected-notifier capability handed to the control stream: it
/// can latch the slot's fuse true, and nothing else.
#[derive(Debug, Clone)]
pub struct ConnectedFuse {
    fuse: BooleanFuse,
}

impl ConnectedFuse {
    /// Wraps a slot's fuse.
    pub fn new(fuse: BooleanFuse) -> Self {
        Self { fuse }
    }

    /// Marks the connection as registered with the edge.
    pub fn connected(&self) {
        self.fuse.fuse(true);
    }

    /// Whether the connection has registered.
    pub fn is_connected(&self) -> bool {
        self.fuse.value() == Some(true)
    }
}
