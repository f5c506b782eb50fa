//! Reconnect backoff policy.
//!
//! `delay(n) = min(max, base * 2^n + jitter)` with `jitter` uniform in
//! `[0, jitter)`. The caller owns the retry counter: bump it on every failed
//! or dropped attempt, reset it to zero after a successful connect.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub jitter: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            jitter: Duration::from_millis(500),
            max: Duration::from_secs(20),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, jitter: Duration, max: Duration) -> Self {
        Self { base, jitter, max }
    }

    /// Delay before retry number `retry` (0-based), with fresh jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let span = self.jitter.as_millis() as u64;
        let jitter = if span == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..span)
        };
        self.delay_with_jitter(retry, Duration::from_millis(jitter))
    }

    /// Deterministic variant: the caller supplies the jitter.
    pub fn delay_with_jitter(&self, retry: u32, jitter: Duration) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let millis = (self.base.as_millis() as u64)
            .saturating_mul(factor)
            .saturating_add(jitter.as_millis() as u64);
        Duration::from_millis(millis).min(self.max)
    }
}
