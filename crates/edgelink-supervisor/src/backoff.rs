//! Exponential backoff with a capped retry budget.

use std::time::Duration;

use rand::Rng;

/// Longest delay the backoff will produce regardless of retry count.
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 5);

/// Per-slot retry scheduler: exponential growth with jitter, a retry
/// ceiling, and an optional retry-forever mode that keeps waiting at the
/// ceiling instead of giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffHandler {
    base_time: Duration,
    max_retries: u32,
    retry_forever: bool,
    retries: u32,
}

impl BackoffHandler {
    /// Creates a backoff starting at `base_time` with the given retry ceiling.
    pub fn new(base_time: Duration, max_retries: u32) -> Self {
        Self {
            base_time,
            max_retries,
            retry_forever: false,
            retries: 0,
        }
    }

    /// Keeps producing (capped) delays past the retry ceiling.
    pub fn with_retry_forever(mut self, retry_forever: bool) -> Self {
        self.retry_forever = retry_forever;
        self
    }

    /// The upper bound on the next wait, and whether another attempt remains.
    /// `false` means the retry ceiling has been reached.
    pub fn current_backoff(&self) -> (Duration, bool) {
        let duration = self.backoff_for(self.retries.saturating_add(1));
        let more = self.retries <= self.max_retries || self.retry_forever;
        (duration, more)
    }

    /// Consumes one attempt: bumps the retry count and returns a jittered
    /// wait, or `None` when the budget is spent.
    pub fn backoff_timer(&mut self) -> Option<Duration> {
        if self.retries > self.max_retries {
            if !self.retry_forever {
                return None;
            }
        } else {
            self.retries += 1;
        }

        let upper = self.backoff_for(self.retries);
        let lower = upper / 2;
        if upper.is_zero() {
            return Some(upper);
        }
        let millis = rand::thread_rng().gen_range(lower.as_millis()..=upper.as_millis());
        Some(Duration::from_millis(millis as u64))
    }

    /// Whether the retry count has reached the ceiling.
    pub fn reached_max_retries(&self) -> bool {
        self.retries >= self.max_retries
    }

    /// Attempts made since the last reset.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Clears the retry count; the next wait starts from the base again.
    pub fn reset_now(&mut self) {
        self.retries = 0;
    }

    fn backoff_for(&self, exponent: u32) -> Duration {
        let factor = if exponent >= 31 {
            u32::MAX
        } else {
            1u32 << exponent
        };
        self.base_time.saturating_mul(factor).min(MAX_BACKOFF)
    }
}
