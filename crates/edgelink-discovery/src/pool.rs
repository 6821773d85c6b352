//! Slot-indexed pool of edge addresses.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::addr::EdgeAddr;
use crate::error::DiscoveryError;

#[derive(Debug, Default)]
struct PoolState {
    assigned: HashMap<usize, EdgeAddr>,
    reserve: VecDeque<EdgeAddr>,
}

/// Pool of candidate edge endpoints, one binding per connection slot plus an
/// ordered reserve of unassigned addresses.
///
/// Populated once at supervisor start and mutated only through
/// [`get_addr`](EdgePool::get_addr) and
/// [`get_different_addr`](EdgePool::get_different_addr). All operations are
/// serialized by a single mutex and safe to call from any task.
///
/// Invariant: while the reserve is non-empty, no address is bound to two
/// slots at once.
#[derive(Debug)]
pub struct EdgePool {
    state: Mutex<PoolState>,
}

impl EdgePool {
    /// Builds a pool from an ordered list of candidate addresses.
    pub fn new(addrs: impl IntoIterator<Item = EdgeAddr>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                assigned: HashMap::new(),
                reserve: addrs.into_iter().collect(),
            }),
        }
    }

    /// Returns the address bound to `slot`, binding the reserve head on first
    /// call. Deterministic given the pool's ordering.
    pub fn get_addr(&self, slot: usize) -> Result<EdgeAddr, DiscoveryError> {
        let mut state = self.state.lock().unwrap();
        if let Some(addr) = state.assigned.get(&slot) {
            return Ok(addr.clone());
        }
        match state.reserve.pop_front() {
            Some(addr) => {
                state.assigned.insert(slot, addr.clone());
                Ok(addr)
            }
            None => Err(DiscoveryError::NoAddressesLeft),
        }
    }

    /// Releases the slot's current binding back to the reserve and assigns
    /// the first reserve address that differs from it.
    ///
    /// With `force`, the released address is re-assigned (wrap-around) when
    /// it is the only one left; without `force` that case fails with
    /// [`DiscoveryError::NoAddressesLeft`]. On failure the released address
    /// stays in the reserve for other slots.
    pub fn get_different_addr(
        &self,
        slot: usize,
        force: bool,
    ) -> Result<EdgeAddr, DiscoveryError> {
        let mut state = self.state.lock().unwrap();
        let previous = state.assigned.remove(&slot);
        if let Some(previous) = previous.clone() {
            state.reserve.push_back(previous);
        }

        let different = state
            .reserve
            .iter()
            .position(|addr| Some(addr) != previous.as_ref());
        let picked = match different {
            Some(index) => state.reserve.remove(index),
            None if force => state.reserve.pop_front(),
            None => None,
        };

        match picked {
            Some(addr) => {
                state.assigned.insert(slot, addr.clone());
                Ok(addr)
            }
            None => Err(DiscoveryError::NoAddressesLeft),
        }
    }

    /// Number of unassigned addresses remaining. Diagnostic.
    pub fn available_addrs(&self) -> usize {
        self.state.lock().unwrap().reserve.len()
    }
}
