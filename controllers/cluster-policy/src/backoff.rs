//! # Fibonacci Backoff
//!
//! Failed resources are skipped by `watch` until their backoff expires, so
//! one broken rule does not rewrite its cluster every resync.
//!
//! Sequence with the defaults: 30s, 30s, 60s, 90s, 150s, 240s, 390s, 600s (max).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Fibonacci backoff calculator, in seconds
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_secs;
        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = std::cmp::min(next, self.max_secs);
        Duration::from_secs(result)
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(30, 600)
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
    retry_at: Instant,
}

/// Per-address backoff bookkeeping for the watch loop
#[derive(Debug, Default)]
pub struct Backoffs {
    states: HashMap<String, BackoffState>,
}

impl Backoffs {
    /// Whether `address` may be reconciled at `now`
    pub fn ready(&self, address: &str, now: Instant) -> bool {
        self.states.get(address).is_none_or(|s| now >= s.retry_at)
    }

    /// Record a failure and return (delay before the next attempt, consecutive errors)
    pub fn record_failure(&mut self, address: &str, now: Instant) -> (Duration, u32) {
        let state = self.states.entry(address.to_string()).or_insert_with(|| BackoffState {
            backoff: FibonacciBackoff::default(),
            error_count: 0,
            retry_at: now,
        });
        let delay = state.backoff.next_backoff();
        state.error_count += 1;
        state.retry_at = now + delay;
        (delay, state.error_count)
    }

    /// Forget the failures of `address` after a successful reconcile
    pub fn record_success(&mut self, address: &str) {
        self.states.remove(address);
    }

    pub fn error_count(&self, address: &str) -> u32 {
        self.states.get(address).map_or(0, |s| s.error_count)
    }
}
