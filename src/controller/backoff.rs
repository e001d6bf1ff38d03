//! # Backoff
//!
//! Per-key exponential backoff used by the work queue's rate-limited requeue.
//!
//! The delay doubles with each consecutive failure of the same key and is capped:
//! `base, 2*base, 4*base, ... , max`. Each key keeps its own failure count so one
//! failing resource never slows down another. A success resets the count.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Capped exponential delay sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay after `failures` previous consecutive failures (0-indexed)
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Failure counts tracked per key
#[derive(Debug)]
pub struct KeyedBackoff<K> {
    backoff: ExponentialBackoff,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash> KeyedBackoff<K> {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            failures: HashMap::new(),
        }
    }

    /// Record a failure of `key` and return how long to wait before retrying it
    pub fn next_delay(&mut self, key: K) -> Duration {
        let failures = self.failures.entry(key).or_insert(0);
        let delay = self.backoff.delay_for(*failures);
        *failures = failures.saturating_add(1);
        delay
    }

    /// Reset `key` after a success
    pub fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(800));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(200), Duration::from_secs(1));
    }

    #[test]
    fn test_keys_back_off_independently() {
        let mut keyed = KeyedBackoff::new(ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_secs(300),
        ));
        assert_eq!(keyed.next_delay("voting"), Duration::from_millis(10));
        assert_eq!(keyed.next_delay("voting"), Duration::from_millis(20));
        assert_eq!(keyed.next_delay("result"), Duration::from_millis(10));
        assert_eq!(keyed.failures(&"voting"), 2);

        keyed.forget(&"voting");
        assert_eq!(keyed.failures(&"voting"), 0);
        assert_eq!(keyed.next_delay("voting"), Duration::from_millis(10));
    }

    #[test]
    fn test_max_below_base_is_raised() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(2));
    }
}
