//! Seams between the gate's logic and the outside world.
//!
//! The limiter needs time and a place to keep buckets; the relay needs two
//! frame sockets and a way to dial the realtime service. Everything behind
//! these traits lives in `infrastructure`.

use crate::domain::error::RelayError;
use crate::domain::frame::Frame;
use futures_util::{Sink, Stream};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Instant;

/// A stored bucket offered to an [`EvictionPolicy`].
///
/// Values are snapshots; no map guard is held while the policy runs.
pub struct EvictionCandidate<K, V> {
    pub key: K,
    /// Copy of the bucket
    pub value: V,
    /// When the bucket was last enforced against
    pub last_access: Instant,
}

/// Bounds how many buckets the in-process store keeps.
///
/// `ShardedStorage` asks the policy before inserting a new key and, when it
/// says so, drops the victim it picks.
pub trait EvictionPolicy<K, V>: Send + Sync + Debug
where
    K: Clone,
    V: Clone,
{
    /// Pick the key to drop, or `None` to keep everything.
    fn select_victim(&self, candidates: &[EvictionCandidate<K, V>]) -> Option<K>;

    /// Whether inserting one more bucket needs a victim first.
    ///
    /// `current_memory_bytes` stays 0 unless [`tracks_memory`](Self::tracks_memory)
    /// is true.
    fn should_evict(&self, current_entries: usize, current_memory_bytes: usize) -> bool;

    fn tracks_memory(&self) -> bool {
        false
    }

    /// Approximate bytes held by one bucket and its key.
    fn estimate_entry_size(&self, _key: &K, _value: &V) -> usize {
        0
    }
}

/// Source of monotonic time for windows and breaker timeouts.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Where buckets live between requests.
///
/// `ShardedStorage` keeps them in process. With the `redis-storage` feature,
/// `RedisStorage` shares them between gate instances.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Run `accessor` on the bucket for `key`, creating it with `factory`
    /// first if needed.
    ///
    /// Whatever `accessor` changes must be seen by the next call for `key`.
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Number of stored buckets.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;

    /// Drop every bucket.
    fn clear(&self);

    /// Visit every bucket.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Keep only the buckets for which `f` returns true.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Port for one side of a relay session.
///
/// A socket yields incoming frames and accepts outgoing ones. Adapters wrap
/// axum's server socket and tokio-tungstenite client streams; tests use
/// `MockSocket`.
pub trait FrameSocket:
    Stream<Item = Result<Frame, RelayError>> + Sink<Frame, Error = RelayError> + Send + Unpin
{
}

impl<T> FrameSocket for T where
    T: Stream<Item = Result<Frame, RelayError>> + Sink<Frame, Error = RelayError> + Send + Unpin
{
}

/// Type-erased relay socket.
pub type BoxedSocket = Box<dyn FrameSocket>;

/// Port for opening the outbound connection of a relay session.
#[async_trait::async_trait]
pub trait UpstreamConnector: Send + Sync + Debug {
    /// Open a connection to the upstream realtime service.
    ///
    /// # Errors
    /// Returns `RelayError::UpstreamUnavailable` or
    /// `RelayError::UpstreamRejected` when no socket could be established.
    async fn connect(&self) -> Result<BoxedSocket, RelayError>;
}
