//! Connection lifecycle events.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;
use crate::tracker::ConnTracker;

/// A connection lifecycle event, keyed by slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// The slot registered with the edge.
    Connected {
        /// Slot index.
        slot: u8,
        /// Protocol the registration happened over.
        protocol: Protocol,
    },
    /// The slot lost its connection and is backing off before a retry.
    Reconnecting {
        /// Slot index.
        slot: u8,
    },
    /// The slot's connection ended.
    Disconnected {
        /// Slot index.
        slot: u8,
    },
}

type EventListener = Box<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Fans connection events out to registered listeners and keeps the shared
/// [`ConnTracker`] current.
pub struct Observer {
    tracker: Arc<ConnTracker>,
    listeners: Mutex<Vec<EventListener>>,
}

impl Observer {
    /// Creates an observer feeding the given tracker.
    pub fn new(tracker: Arc<ConnTracker>) -> Self {
        Self {
            tracker,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Registers an event listener callback.
    pub fn register_listener(&self, listener: impl Fn(&ConnectionEvent) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// The tracker this observer maintains.
    pub fn tracker(&self) -> &Arc<ConnTracker> {
        &self.tracker
    }

    /// Reports a successful registration.
    pub fn send_connected(&self, slot: u8, protocol: Protocol) {
        self.tracker.mark_connected(slot, protocol);
        self.emit(ConnectionEvent::Connected { slot, protocol });
    }

    /// Reports that the slot is waiting to retry.
    pub fn send_reconnect(&self, slot: u8) {
        self.tracker.mark_reconnecting(slot);
        self.emit(ConnectionEvent::Reconnecting { slot });
    }

    /// Reports that the slot's connection ended.
    pub fn send_disconnect(&self, slot: u8) {
        self.tracker.mark_disconnected(slot);
        self.emit(ConnectionEvent::Disconnected { slot });
    }

    fn emit(&self, event: ConnectionEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(&event);
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("listeners", &self.listeners.lock().unwrap().len())
            .finish()
    }
}
