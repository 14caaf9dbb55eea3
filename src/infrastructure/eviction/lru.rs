//! Bound on the number of buckets.

use super::stalest;
use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// Bucket count limit with least-recently-used eviction.
///
/// Storage samples a handful of entries when full; the one touched longest
/// ago is dropped. A dropped bucket only means that caller gets a fresh
/// window, so approximate recency is good enough.
#[derive(Debug, Clone)]
pub struct LruEviction {
    max_entries: usize,
}

impl LruEviction {
    /// Keep at most `max_buckets` buckets.
    pub fn new(max_buckets: usize) -> Self {
        Self {
            max_entries: max_buckets,
        }
    }

    /// Configured bucket bound.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K, V> EvictionPolicy<K, V> for LruEviction
where
    K: Clone,
    V: Clone,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K> {
        stalest(candidates)
    }

    fn should_evict(&self, buckets: usize, _bytes: usize) -> bool {
        buckets >= self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{bucket::Bucket, key::RateLimitKey};
    use std::time::{Duration, Instant};

    fn candidate(key: &str, age_secs: u64, now: Instant) -> EvictionCandidate<RateLimitKey, Bucket> {
        EvictionCandidate {
            key: RateLimitKey::from(key),
            value: Bucket::new(),
            last_access: now - Duration::from_secs(age_secs),
        }
    }

    #[test]
    fn test_drops_bucket_idle_longest() {
        let policy = LruEviction::new(3);
        let now = Instant::now();
        let candidates = vec![
            candidate("chat:a", 0, now),
            candidate("chat:b", 10, now),
            candidate("chat:c", 5, now),
        ];

        assert_eq!(
            policy.select_victim(&candidates),
            Some(RateLimitKey::from("chat:b"))
        );
    }

    #[test]
    fn test_no_candidates_no_victim() {
        let policy = LruEviction::new(1);
        let none: &[EvictionCandidate<RateLimitKey, Bucket>] = &[];
        assert_eq!(policy.select_victim(none), None);
    }

    #[test]
    fn test_should_evict_at_limit() {
        let policy = LruEviction::new(100);
        let check = |n| <LruEviction as EvictionPolicy<RateLimitKey, Bucket>>::should_evict(&policy, n, 0);

        assert!(!check(99));
        assert!(check(100));
        assert!(check(101));
        assert!(!<LruEviction as EvictionPolicy<RateLimitKey, Bucket>>::tracks_memory(&policy));
    }
}
