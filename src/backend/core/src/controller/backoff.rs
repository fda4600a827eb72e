//! Per-key exponential requeue delay.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;

pub struct Backoff<K> {
    base: Duration,
    max: Duration,
    failures: DashMap<K, u32>,
}

impl<K> Backoff<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }

    /// Delay before the next attempt for `key`; doubles on every call.
    pub fn next_delay(&self, key: &K) -> Duration {
        let mut failures = self.failures.entry(key.clone()).or_insert(0);
        let exponent = (*failures).min(31);
        *failures = failures.saturating_add(1);

        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Forget `key`'s failures after a successful reconcile.
    pub fn reset(&self, key: &K) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).map(|f| *f).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_up_to_max() {
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_millis(30));
        let key = "ns";

        assert_eq!(backoff.next_delay(&key), Duration::from_millis(5));
        assert_eq!(backoff.next_delay(&key), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(&key), Duration::from_millis(20));
        assert_eq!(backoff.next_delay(&key), Duration::from_millis(30));
        assert_eq!(backoff.failures(&key), 4);
    }

    #[test]
    fn test_reset_and_independent_keys() {
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_secs(1000));
        backoff.next_delay(&"a");
        backoff.next_delay(&"a");
        assert_eq!(backoff.next_delay(&"b"), Duration::from_millis(5));

        backoff.reset(&"a");
        assert_eq!(backoff.failures(&"a"), 0);
        assert_eq!(backoff.next_delay(&"a"), Duration::from_millis(5));
    }

    #[test]
    fn test_large_exponent_saturates() {
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_secs(1000));
        for _ in 0..64 {
            backoff.next_delay(&"k");
        }
        assert_eq!(backoff.next_delay(&"k"), Duration::from_secs(1000));
    }
}
