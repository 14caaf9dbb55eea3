//! Byte budget for the bucket store.

use super::stalest;
use crate::application::ports::{EvictionCandidate, EvictionPolicy};
use crate::domain::{bucket::Bucket, key::RateLimitKey};
use std::mem::size_of;
use std::time::{Duration, Instant};

/// Map slot overhead: hash, control bytes and access bookkeeping.
const SLOT_OVERHEAD: usize = 64;

/// Byte budget for the bucket store, evicting least recently used first.
///
/// Sizes are estimates: the key's string, the bucket's timestamp queue and a
/// fixed per-slot overhead. A bucket is sized when it is created, so one
/// that grows afterwards is under-counted until it is recreated.
#[derive(Debug, Clone)]
pub struct MemoryEviction {
    max_bytes: usize,
}

impl MemoryEviction {
    /// Budget of `max_bytes` across all buckets.
    ///
    /// ```
    /// use realtor_gate::infrastructure::eviction::MemoryEviction;
    ///
    /// let policy = MemoryEviction::new(5 * 1024 * 1024);
    /// assert_eq!(policy.max_bytes(), 5 * 1024 * 1024);
    /// ```
    pub fn new(budget: usize) -> Self {
        Self { max_bytes: budget }
    }

    /// Configured byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl EvictionPolicy<RateLimitKey, Bucket> for MemoryEviction {
    fn select_victim(&self, candidates: &[EvictionCandidate<RateLimitKey, Bucket>]) -> Option<RateLimitKey> {
        stalest(candidates)
    }

    fn should_evict(&self, _buckets: usize, bytes: usize) -> bool {
        bytes >= self.max_bytes
    }

    fn tracks_memory(&self) -> bool {
        true
    }

    fn estimate_entry_size(&self, key: &RateLimitKey, bucket: &Bucket) -> usize {
        size_of::<RateLimitKey>()
            + key.as_str().len()
            + size_of::<Bucket>()
            + bucket.len() * size_of::<Instant>()
            + size_of::<Duration>()
            + SLOT_OVERHEAD
    }
}
