//! Failure counting and backoff.

use std::time::Duration;

/// Mutable collection state, owned by the collector.
///
/// The next sleep interval grows linearly with consecutive failures:
/// `base * (min(failures, max) + 1)`. Once the failure count reaches `max`
/// it is clamped there and the state is degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionState {
    consecutive_failures: u32,
    base_interval: Duration,
    max_failures: u32,
}

impl CollectionState {
    pub fn new(base_interval: Duration, max_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            base_interval,
            max_failures,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures >= self.max_failures
    }

    /// Clamp the failure count and compute the sleep before the next cycle.
    pub fn next_interval(&mut self) -> Duration {
        if self.consecutive_failures > self.max_failures {
            self.consecutive_failures = self.max_failures;
        }
        self.base_interval * (self.consecutive_failures + 1)
    }
}
