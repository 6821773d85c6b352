//! Shared view of every slot's connection state.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::protocol::Protocol;

/// State of one connection slot as last reported by its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The slot registered with the edge over the given protocol.
    Connected(Protocol),
    /// The slot lost its connection and is waiting to retry.
    Reconnecting,
    /// The slot's connection ended.
    Disconnected,
}

#[derive(Debug, Default)]
struct TrackerState {
    slots: HashMap<u8, ConnectionStatus>,
    proven: HashSet<Protocol>,
}

/// Thread-safe per-slot connection status map.
///
/// The protocol-fallback suppression rule reads this: once any slot has
/// connected with the currently selected protocol, no slot downgrades to the
/// fallback. That evidence is sticky: a routine disconnect (idle timeout, a
/// reconnect signal, a server-side teardown) does not erase the proof that
/// the protocol works. Only [`reset_evidence`](ConnTracker::reset_evidence)
/// forgets it.
#[derive(Debug, Default)]
pub struct ConnTracker {
    state: Mutex<TrackerState>,
}

impl ConnTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful registration on `slot` over `protocol`.
    pub fn mark_connected(&self, slot: u8, protocol: Protocol) {
        let mut state = self.state.lock().unwrap();
        state.slots.insert(slot, ConnectionStatus::Connected(protocol));
        state.proven.insert(protocol);
    }

    /// Records that `slot` is waiting to retry.
    pub fn mark_reconnecting(&self, slot: u8) {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(slot, ConnectionStatus::Reconnecting);
    }

    /// Records that `slot`'s connection ended.
    pub fn mark_disconnected(&self, slot: u8) {
        self.state
            .lock()
            .unwrap()
            .slots
            .insert(slot, ConnectionStatus::Disconnected);
    }

    /// The last reported status of `slot`.
    pub fn status(&self, slot: u8) -> Option<ConnectionStatus> {
        self.state.lock().unwrap().slots.get(&slot).copied()
    }

    /// Whether any slot has connected over `protocol` at some point. The
    /// evidence survives disconnects; a slot mid-reconnect still counts as
    /// proof that the protocol works.
    pub fn has_connected_with(&self, protocol: Protocol) -> bool {
        self.state.lock().unwrap().proven.contains(&protocol)
    }

    /// Number of currently connected slots.
    pub fn connected_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .slots
            .values()
            .filter(|status| matches!(status, ConnectionStatus::Connected(_)))
            .count()
    }

    /// Forgets which protocols have been proven to work, keeping only those
    /// with a live connection right now. For policy resets, such as a
    /// selector change; routine disconnects never clear the evidence.
    pub fn reset_evidence(&self) {
        let mut state = self.state.lock().unwrap();
        let live: HashSet<Protocol> = state
            .slots
            .values()
            .filter_map(|status| match status {
                ConnectionStatus::Connected(protocol) => Some(*protocol),
                _ => None,
            })
            .collect();
        state.proven = live;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker() {
        let tracker = ConnTracker::new();
        assert_eq!(tracker.status(0), None);
        assert!(!tracker.has_connected_with(Protocol::Quic));
        assert_eq!(tracker.connected_count(), 0);
    }

    #[test]
    fn test_mark_connected() {
        let tracker = ConnTracker::new();
        tracker.mark_connected(0, Protocol::Quic);
        assert_eq!(
            tracker.status(0),
            Some(ConnectionStatus::Connected(Protocol::Quic))
        );
        assert!(tracker.has_connected_with(Protocol::Quic));
        assert!(!tracker.has_connected_with(Protocol::Http2));
        assert_eq!(tracker.connected_count(), 1);
    }

    #[test]
    fn test_evidence_survives_disconnect() {
        let tracker = ConnTracker::new();
        tracker.mark_connected(0, Protocol::Quic);
        tracker.mark_disconnected(0);

        // The live status changes but the protocol stays proven.
        assert_eq!(tracker.status(0), Some(ConnectionStatus::Disconnected));
        assert_eq!(tracker.connected_count(), 0);
        assert!(tracker.has_connected_with(Protocol::Quic));
    }

    #[test]
    fn test_evidence_survives_reconnecting() {
        let tracker = ConnTracker::new();
        tracker.mark_connected(0, Protocol::Quic);
        tracker.mark_reconnecting(0);
        assert!(tracker.has_connected_with(Protocol::Quic));
    }

    #[test]
    fn test_reset_evidence_keeps_live_connections() {
        let tracker = ConnTracker::new();
        tracker.mark_connected(0, Protocol::Quic);
        tracker.mark_connected(1, Protocol::Http2);
        tracker.mark_disconnected(1);

        tracker.reset_evidence();

        // Slot 0 is still connected over QUIC, so that proof remains.
        assert!(tracker.has_connected_with(Protocol::Quic));
        assert!(!tracker.has_connected_with(Protocol::Http2));
    }

    #[test]
    fn test_multiple_slots() {
        let tracker = ConnTracker::new();
        tracker.mark_connected(0, Protocol::Quic);
        tracker.mark_reconnecting(1);
        tracker.mark_connected(2, Protocol::Http2);
        assert!(tracker.has_connected_with(Protocol::Quic));
        assert!(tracker.has_connected_with(Protocol::Http2));
        assert_eq!(tracker.connected_count(), 2);
        assert_eq!(tracker.status(1), Some(ConnectionStatus::Reconnecting));
    }
}
