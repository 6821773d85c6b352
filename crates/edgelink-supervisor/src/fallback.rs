//! Per-slot protocol selection across repeated failures.

use std::time::Duration;

use tracing::{info, warn};

use edgelink_connection::{Protocol, ProtocolSelector, TunnelError};

use crate::backoff::BackoffHandler;

/// Backoff decorated with the slot's protocol choice. Each slot keeps its own
/// copy because individual slots may fall back to another protocol when a
/// particular edge host cannot serve the preferred one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFallback {
    backoff: BackoffHandler,
    protocol: Protocol,
    in_fallback: bool,
}

impl ProtocolFallback {
    /// Creates fallback state starting on the given protocol.
    pub fn new(backoff: BackoffHandler, protocol: Protocol) -> Self {
        Self {
            backoff,
            protocol,
            in_fallback: false,
        }
    }

    /// Protocol for the next attempt.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Whether this slot already switched away from the preferred protocol.
    pub fn in_fallback(&self) -> bool {
        self.in_fallback
    }

    /// Clears the retry budget and the fallback flag. Runs on every
    /// successful connect.
    pub fn reset(&mut self) {
        self.backoff.reset_now();
        self.in_fallback = false;
    }

    /// Switches to the fallback protocol with a fresh retry budget.
    pub fn fallback(&mut self, protocol: Protocol) {
        self.backoff.reset_now();
        self.protocol = protocol;
        self.in_fallback = true;
    }

    /// Realigns to the selector's current protocol, which out-of-band
    /// configuration may have changed since the last attempt.
    pub fn align_current(&mut self, selector: &dyn ProtocolSelector, slot: u8) {
        let current = selector.current();
        if self.protocol != current {
            self.protocol = current;
            info!(conn_index = slot, "Changing protocol to {current}");
        }
    }

    /// See [`BackoffHandler::current_backoff`].
    pub fn current_backoff(&self) -> (Duration, bool) {
        self.backoff.current_backoff()
    }

    /// See [`BackoffHandler::backoff_timer`].
    pub fn backoff_timer(&mut self) -> Option<Duration> {
        self.backoff.backoff_timer()
    }

    /// See [`BackoffHandler::reached_max_retries`].
    pub fn reached_max_retries(&self) -> bool {
        self.backoff.reached_max_retries()
    }

    /// Attempts since the last successful connect.
    pub fn retries(&self) -> u32 {
        self.backoff.retries()
    }
}

/// Picks the protocol for the next retry iteration. Returns `false` when the
/// slot is out of options and should stop retrying.
///
/// Order of the decision:
/// 1. A broken-QUIC failure with a fallback available switches immediately.
/// 2. Hitting the retry ceiling with a fallback available switches.
/// 3. Already on the fallback: give up.
/// 4. Otherwise, realign to the selector's current protocol and keep going.
pub fn select_next_protocol(
    slot: u8,
    fallback: &mut ProtocolFallback,
    selector: &dyn ProtocolSelector,
    cause: &TunnelError,
) -> bool {
    let quic_broken = cause.is_quic_broken();
    let has_fallback = selector.fallback().is_some();

    if fallback.reached_max_retries() || (has_fallback && quic_broken) {
        if quic_broken {
            warn!(
                conn_index = slot,
                "QUIC connections to the edge keep failing in a way that suggests the \
                 machine or network is blocking or dropping outbound UDP. Allow UDP egress \
                 to the edge ports, or expect datagram features to stay unavailable while \
                 the tunnel runs on the fallback transport."
            );
        }

        let Some(next) = selector.fallback() else {
            return false;
        };
        // Already using the fallback protocol, no point retrying further.
        if fallback.protocol() == next {
            return false;
        }
        info!(conn_index = slot, "Switching to fallback protocol {next}");
        fallback.fallback(next);
    } else if !fallback.in_fallback() {
        fallback.align_current(selector, slot);
    }
    true
}
