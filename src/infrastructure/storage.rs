//! In-process bucket storage.
//!
//! Provides a concurrent, sharded map with optional capacity enforcement
//! through an `EvictionPolicy`.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, EvictionCandidate, EvictionPolicy, Storage};
use crate::infrastructure::clock::SystemClock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Entries offered to the eviction policy per round.
const EVICTION_SAMPLE_SIZE: usize = 8;

/// Upper bound on evictions performed by a single insert.
const MAX_EVICTIONS_PER_INSERT: usize = 16;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_access: Instant,
    /// Estimated size recorded at insert (0 when memory is untracked)
    size: usize,
}

/// In-process bucket store over a sharded `DashMap`.
///
/// Reads and writes lock only the shard owning the key, so independent
/// callers rarely contend. With an eviction policy installed, inserting a
/// new key first makes room by dropping sampled least-recently-used entries.
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    map: DashMap<K, Slot<V>, ahash::RandomState>,
    eviction: Option<Arc<dyn EvictionPolicy<K, V>>>,
    memory_bytes: AtomicUsize,
    metrics: Metrics,
    clock: Arc<dyn Clock>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an unbounded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(ahash::RandomState::new()),
            eviction: None,
            memory_bytes: AtomicUsize::new(0),
            metrics: Metrics::new(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Stamp access recency with `clock`, normally the registry's clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record evictions into `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Bound the storage with `policy`.
    pub fn with_eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K, V>>) -> Self {
        self.eviction = Some(policy);
        self
    }

    /// Clone the value stored for `key`.
    pub fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|slot| slot.value.clone())
    }

    /// Check if a key exists.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Drop the bucket for `key`, returning it.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).map(|(_, slot)| {
            self.memory_bytes.fetch_sub(slot.size, Ordering::Relaxed);
            slot.value
        })
    }

    /// Estimated bytes held, if the eviction policy tracks memory.
    pub fn memory_usage(&self) -> usize {
        self.memory_bytes.load(Ordering::Relaxed)
    }

    /// Evict until the policy is satisfied. Must be called without holding
    /// any map guard.
    fn make_room(&self, policy: &Arc<dyn EvictionPolicy<K, V>>) {
        for _ in 0..MAX_EVICTIONS_PER_INSERT {
            if !policy.should_evict(self.map.len(), self.memory_usage()) {
                return;
            }

            let candidates: Vec<EvictionCandidate<K, V>> = self
                .map
                .iter()
                .take(EVICTION_SAMPLE_SIZE)
                .map(|entry| EvictionCandidate {
                    key: entry.key().clone(),
                    value: entry.value().value.clone(),
                    last_access: entry.value().last_access,
                })
                .collect();

            let Some(victim) = policy.select_victim(&candidates) else {
                return;
            };
            if self.remove(&victim).is_some() {
                self.metrics.record_eviction();
            }
        }
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedStorage")
            .field("entries", &self.map.len())
            .field("memory_bytes", &self.memory_usage())
            .field("eviction", &self.eviction)
            .finish()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let now = self.clock.now();
        if let Some(mut slot) = self.map.get_mut(&key) {
            slot.last_access = now;
            return accessor(&mut slot.value);
        }

        // Evicting takes shard locks of its own, so it must run before
        // `entry` locks the target shard.
        if let Some(policy) = &self.eviction {
            self.make_room(policy);
        }

        match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.last_access = now;
                accessor(&mut slot.value)
            }
            Entry::Vacant(vacant) => {
                let value = factory();
                let size = match &self.eviction {
                    Some(policy) if policy.tracks_memory() => {
                        policy.estimate_entry_size(vacant.key(), &value)
                    }
                    _ => 0,
                };
                self.memory_bytes.fetch_add(size, Ordering::Relaxed);
                let mut slot = vacant.insert(Slot {
                    value,
                    last_access: now,
                    size,
                });
                accessor(&mut slot.value)
            }
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear();
        self.memory_bytes.store(0, Ordering::Relaxed);
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.map.iter() {
            f(entry.key(), &entry.value().value);
        }
    }

    fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.map.retain(|key, slot| {
            let keep = f(key, &mut slot.value);
            if !keep {
                self.memory_bytes.fetch_sub(slot.size, Ordering::Relaxed);
            }
            keep
        });
    }
}

impl<K, V> Storage<K, V> for Arc<ShardedStorage<K, V>>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        (**self).with_entry_mut(key, factory, accessor)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V),
    {
        (**self).for_each(f)
    }

    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        (**self).retain(f)
    }
}
