//! Out-of-band reconnect requests.

use std::fmt;
use std::time::Duration;

/// A request to tear down the current connection and dial again, optionally
/// after a delay. Sent by tests and operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSignal {
    /// How long the slot sleeps before re-dialing.
    pub delay: Duration,
}

impl ReconnectSignal {
    /// Creates a reconnect signal with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Sleeps the carried delay.
    pub async fn delay_before_reconnect(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl fmt::Display for ReconnectSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reconnect signal in {:?}", self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let signal = ReconnectSignal::new(Duration::from_millis(250));
        assert_eq!(signal.to_string(), "reconnect signal in 250ms");
    }

    #[tokio::test]
    async fn test_zero_delay_returns_immediately() {
        let started = std::time::Instant::now();
        ReconnectSignal::new(Duration::ZERO)
            .delay_before_reconnect()
            .await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_delay_is_respected() {
        let started = std::time::Instant::now();
        ReconnectSignal::new(Duration::from_millis(30))
            .delay_before_reconnect()
            .await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
