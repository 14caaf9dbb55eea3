//! Central registry of rate limit buckets.
//!
//! The registry owns the bucket store and the clock, and hands callers a
//! bucket together with the instant the check is evaluated at.

use crate::application::ports::{Clock, Storage};
use crate::domain::{bucket::Bucket, key::RateLimitKey};
use std::sync::Arc;
use std::time::Instant;

/// Registry managing all rate limit buckets.
///
/// Generic over the storage implementation. In production use
/// `Arc<ShardedStorage>` or, across instances, `RedisStorage`.
#[derive(Clone)]
pub struct BucketRegistry<S>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
}

impl<S> BucketRegistry<S>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    /// Create a new registry over `storage`, reading time from `clock`.
    pub fn new(storage: S, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Access or create the bucket for `key` with a callback.
    ///
    /// The callback receives the bucket and the current instant. Buckets are
    /// created empty on first access.
    pub fn with_bucket<F, R>(&self, key: RateLimitKey, f: F) -> R
    where
        F: FnOnce(&mut Bucket, Instant) -> R,
    {
        let now = self.clock.now();
        self.storage
            .with_entry_mut(key, Bucket::new, |bucket| f(bucket, now))
    }

    /// Drop expired timestamps everywhere and remove buckets left empty.
    ///
    /// Returns the number of buckets removed.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.storage.retain(|_key, bucket| {
            bucket.expire(now);
            let keep = !bucket.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Get the number of tracked buckets.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// True when no caller has a live bucket.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Clear all tracked state.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Iterate over all buckets with a callback.
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&RateLimitKey, &Bucket),
    {
        self.storage.for_each(f);
    }

    /// The clock this registry evaluates checks against.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::RateLimitOptions;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::storage::ShardedStorage;
    use std::time::Duration;

    fn options(limit: u32, window_ms: u64) -> RateLimitOptions {
        RateLimitOptions::from_millis(limit, window_ms).unwrap()
    }

    #[test]
    fn test_registry_creation() {
        let storage = Arc::new(ShardedStorage::new());
        let registry = BucketRegistry::new(storage, Arc::new(SystemClock::new()));

        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_with_bucket_creates_lazily() {
        let storage = Arc::new(ShardedStorage::new());
        let registry = BucketRegistry::new(storage, Arc::new(SystemClock::new()));
        let key = RateLimitKey::new("chat", "u1");

        registry.with_bucket(key.clone(), |bucket, _now| {
            assert!(bucket.is_empty());
        });
        assert_eq!(registry.len(), 1);

        registry.with_bucket(key.clone(), |bucket, now| {
            bucket.register(now, &options(5, 1_000));
        });
        registry.with_bucket(key, |bucket, _now| {
            assert_eq!(bucket.len(), 1);
        });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_prune_expired_removes_stale_buckets() {
        let storage = Arc::new(ShardedStorage::new());
        let clock = Arc::new(MockClock::new(Instant::now()));
        let registry = BucketRegistry::new(storage, clock.clone());

        registry.with_bucket(RateLimitKey::from("short"), |b, now| {
            b.register(now, &options(5, 100));
        });
        registry.with_bucket(RateLimitKey::from("long"), |b, now| {
            b.register(now, &options(5, 10_000));
        });
        assert_eq!(registry.len(), 2);

        clock.advance(Duration::from_millis(500));
        assert_eq!(registry.prune_expired(), 1);
        assert_eq!(registry.len(), 1);

        let mut keys = Vec::new();
        registry.for_each(|key, _| keys.push(key.clone()));
        assert_eq!(keys, vec![RateLimitKey::from("long")]);
    }

    #[test]
    fn test_clear() {
        let storage = Arc::new(ShardedStorage::new());
        let registry = BucketRegistry::new(storage, Arc::new(SystemClock::new()));

        for i in 0..10 {
            registry.with_bucket(RateLimitKey::new("ip", &i.to_string()), |_b, _now| {});
        }
        assert_eq!(registry.len(), 10);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let storage = Arc::new(ShardedStorage::new());
        let registry = Arc::new(BucketRegistry::new(
            storage,
            Arc::new(SystemClock::new()),
        ));
        let mut handles = vec![];

        for i in 0..10 {
            let registry_clone = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = RateLimitKey::new("t", &format!("{}_{}", i, j));
                    registry_clone.with_bucket(key, |_b, _now| {});
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1000);
    }
}
