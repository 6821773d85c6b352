//! Classification of connection failures into rotation decisions.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use edgelink_connection::TunnelError;

/// A network-path failure, distinct from the underlying transport error so
/// upper layers can tell "the path is bad" from "the application failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("connectivity error - reached max retries: {reached_max_retries}")]
pub struct ConnectivityError {
    reached_max_retries: bool,
}

impl ConnectivityError {
    /// Creates a connectivity error, flagged when the rotation budget is spent.
    pub fn new(reached_max_retries: bool) -> Self {
        Self {
            reached_max_retries,
        }
    }

    /// Whether this slot has rotated through enough addresses that the
    /// fallback machinery should escalate from rotation to protocol fallback.
    pub fn has_reached_max_retries(&self) -> bool {
        self.reached_max_retries
    }
}

/// Decides how a slot reacts to an edge connection error.
pub trait EdgeAddrHandler: Send + Sync {
    /// Checks the connection error and returns whether the slot's edge
    /// address should be replaced, and whether the failure counts as a
    /// connectivity error rather than an application error.
    fn should_get_new_address(
        &self,
        slot: u8,
        error: Option<&TunnelError>,
    ) -> (bool, Option<ConnectivityError>);

    /// Clears the slot's rotation counter after a successful connect.
    fn reset(&self, slot: u8);
}

/// Rotation policy: address-level problems rotate immediately; dial failures
/// rotate *and* count toward a per-slot budget, and exhausting the budget
/// surfaces as a max-retries connectivity error so the slot can escalate to
/// protocol fallback.
#[derive(Debug)]
pub struct IpFallbackPolicy {
    max_retries: u8,
    retries_by_slot: Mutex<HashMap<u8, u8>>,
}

impl IpFallbackPolicy {
    /// Creates a policy with the given per-slot rotation budget.
    pub fn new(max_retries: u8) -> Self {
        Self {
            max_retries,
            retries_by_slot: Mutex::new(HashMap::new()),
        }
    }
}

impl EdgeAddrHandler for IpFallbackPolicy {
    fn should_get_new_address(
        &self,
        slot: u8,
        error: Option<&TunnelError>,
    ) -> (bool, Option<ConnectivityError>) {
        let Some(error) = error else {
            return (false, None);
        };
        match error {
            // The address itself is suspect; try the next one.
            TunnelError::DuplicateConnectionRegister | TunnelError::IdleTimeout => (true, None),
            // Network problems rotate immediately and report as connectivity
            // errors; the counter decides when rotation stops helping.
            TunnelError::Dial(_) | TunnelError::QuicDial { .. } => {
                let mut retries = self.retries_by_slot.lock().unwrap();
                let count = retries.entry(slot).or_insert(0);
                if *count >= self.max_retries {
                    *count = 0;
                    (true, Some(ConnectivityError::new(true)))
                } else {
                    *count += 1;
                    (true, Some(ConnectivityError::new(false)))
                }
            }
            _ => (false, None),
        }
    }

    fn reset(&self, slot: u8) {
        self.retries_by_slot.lock().unwrap().remove(&slot);
    }
}
