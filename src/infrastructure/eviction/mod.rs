//! Eviction policy adapters for bucket storage.
//!
//! Each adapter implements the `EvictionPolicy` port and decides when the
//! in-process store is full and which bucket makes room.

pub mod lru;
pub mod memory;

pub use lru::LruEviction;
pub use memory::MemoryEviction;

use crate::application::ports::EvictionCandidate;

/// Key of the candidate enforced against longest ago.
fn stalest<K: Clone, V>(candidates: &[EvictionCandidate<K, V>]) -> Option<K> {
    candidates
        .iter()
        .min_by_key(|c| c.last_access)
        .map(|c| c.key.clone())
}
