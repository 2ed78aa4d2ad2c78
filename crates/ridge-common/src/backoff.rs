//! Per-key exponential backoff for controller error policies
//!
//! kube-runtime's `error_policy` only returns the next requeue delay, so the
//! failure count per object is tracked here and cleared on success.
//!
//! An object deleted while failing is never reconciled again, so its entry
//! cannot be cleared by a success. A failing object is retried at least every
//! `max`, which refreshes its entry; entries untouched for longer than
//! [`IDLE_FACTOR`] × `max` belong to objects that are gone and are evicted on
//! the next failure.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default first retry delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);
/// Default maximum retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);
/// Multiple of the maximum delay after which an untouched entry is evicted
pub const IDLE_FACTOR: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct Failures {
    count: u32,
    last: Instant,
}

/// Tracks consecutive failures per `namespace/name` key
#[derive(Debug)]
pub struct ErrorBackoff {
    failures: DashMap<String, Failures>,
    base: Duration,
    max: Duration,
}

impl Default for ErrorBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ErrorBackoff {
    /// Create a backoff doubling from `base` up to `max`
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            failures: DashMap::new(),
            base,
            max: max.max(base),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying
    pub fn next_delay(&self, key: &str) -> Duration {
        self.next_delay_at(key, Instant::now())
    }

    fn next_delay_at(&self, key: &str, now: Instant) -> Duration {
        let idle = self.max.saturating_mul(IDLE_FACTOR);
        self.failures
            .retain(|_, f| now.saturating_duration_since(f.last) <= idle);

        let mut entry = self
            .failures
            .entry(key.to_string())
            .or_insert(Failures { count: 0, last: now });
        let exp = entry.count.min(16);
        entry.count = entry.count.saturating_add(1);
        entry.last = now;
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }

    /// Forget failures for `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Number of keys with recorded failures
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }

    /// Consecutive failures currently recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|f| f.count).unwrap_or(0)
    }
}
