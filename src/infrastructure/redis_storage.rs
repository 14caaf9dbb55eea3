//! Redis-backed bucket storage.
//!
//! Lets several gate instances share one quota per key. Each bucket is a
//! single Redis string:
//! - Key: configurable prefix followed by the rate limit key
//! - Value: bincode-encoded window and request times in Unix milliseconds
//! - TTL: the bucket's window plus a margin, so idle buckets expire on their
//!   own and no sweeper is needed on the Redis side
//!
//! ## Limitations
//!
//! - `len()` always returns 0 and `is_empty()` always returns false; counting
//!   would need a full `SCAN`.
//! - Read-modify-write is not atomic across instances. Two instances checking
//!   the same key at the same moment may both admit the last slot.
//! - Timestamps are stored with millisecond precision.
//! - The `Storage` port is synchronous, so calls block the current worker via
//!   `block_in_place`. This requires the multi-threaded tokio runtime.
//!
//! Redis failures are logged and treated as an empty bucket: requests keep
//! being served while Redis is down.

use crate::application::ports::Storage;
use crate::domain::{bucket::Bucket, key::RateLimitKey};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::RuntimeFlavor;

/// Persisted form of a [`Bucket`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredBucket {
    window_ms: u64,
    timestamps_ms: Vec<u64>,
}

/// The same moment read from both clocks.
///
/// `Instant`s are process-local, so buckets cross the wire as Unix
/// milliseconds and are mapped back through this anchor.
#[derive(Debug, Clone, Copy)]
struct WallClockAnchor {
    instant: Instant,
    system: SystemTime,
}

impl WallClockAnchor {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            system: SystemTime::now(),
        }
    }

    fn to_epoch_ms(&self, at: Instant) -> u64 {
        let wall = if at >= self.instant {
            self.system.checked_add(at - self.instant)
        } else {
            self.system.checked_sub(self.instant - at)
        };
        wall.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn from_epoch_ms(&self, ms: u64) -> Instant {
        let wall = UNIX_EPOCH + Duration::from_millis(ms);
        match wall.duration_since(self.system) {
            Ok(ahead) => self.instant + ahead,
            Err(behind) => self
                .instant
                .checked_sub(behind.duration())
                .unwrap_or(self.instant),
        }
    }
}

/// Key layout and expiry for buckets kept in Redis.
#[derive(Debug, Clone)]
pub struct RedisStorageConfig {
    /// Prefix for every Redis key (default: "realtor-gate:ratelimit:")
    pub key_prefix: String,
    /// Extra lifetime added to each bucket's window (default: 1 second)
    pub ttl_margin: Duration,
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "realtor-gate:ratelimit:".to_string(),
            ttl_margin: Duration::from_secs(1),
        }
    }
}

/// Redis-backed storage for rate limit buckets shared across instances.
#[derive(Clone)]
pub struct RedisStorage {
    connection: ConnectionManager,
    config: RedisStorageConfig,
    anchor: WallClockAnchor,
}

impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStorage {
    /// Connect using the default `realtor-gate:ratelimit:` prefix.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStorageConfig::default()).await
    }

    /// Connect with an explicit key prefix and TTL margin.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStorageConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!(prefix = %config.key_prefix, "Connected rate limit storage to Redis");

        Ok(Self {
            connection,
            config,
            anchor: WallClockAnchor::now(),
        })
    }

    fn redis_key(&self, key: &RateLimitKey) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn encode(&self, bucket: &Bucket) -> StoredBucket {
        StoredBucket {
            window_ms: u64::try_from(bucket.window().as_millis()).unwrap_or(u64::MAX),
            timestamps_ms: bucket.timestamps().map(|t| self.anchor.to_epoch_ms(t)).collect(),
        }
    }

    fn decode(&self, stored: StoredBucket) -> Bucket {
        Bucket::from_parts(
            Duration::from_millis(stored.window_ms),
            stored
                .timestamps_ms
                .into_iter()
                .map(|ms| self.anchor.from_epoch_ms(ms)),
        )
    }

    async fn get(&self, key: &RateLimitKey) -> Result<Option<Bucket>, RedisError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection.clone();
        let bytes: Option<Vec<u8>> = conn.get(&redis_key).await?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };
        match bincode::deserialize::<StoredBucket>(&bytes) {
            Ok(stored) => Ok(Some(self.decode(stored))),
            Err(err) => {
                tracing::warn!(key = %redis_key, error = %err, "Discarding corrupt bucket");
                conn.del::<_, ()>(&redis_key).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &RateLimitKey, bucket: &Bucket) -> Result<(), RedisError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection.clone();

        if bucket.is_empty() {
            return conn.del(&redis_key).await;
        }

        let stored = self.encode(bucket);
        let bytes = match bincode::serialize(&stored) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(key = %redis_key, error = %err, "Failed to encode bucket");
                return Ok(());
            }
        };
        let ttl = bucket.window() + self.config.ttl_margin;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        conn.pset_ex(&redis_key, bytes, ttl_ms).await
    }

    async fn del(&self, redis_key: &str) -> Result<(), RedisError> {
        let mut conn = self.connection.clone();
        conn.del(redis_key).await
    }

    /// Collect all keys under the configured prefix.
    async fn scan_keys(&self) -> Result<Vec<String>, RedisError> {
        let pattern = format!("{}*", self.config.key_prefix);
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    fn scanned_keys(&self) -> Vec<(String, RateLimitKey)> {
        match block_on(self.scan_keys()) {
            Some(Ok(keys)) => keys
                .into_iter()
                .filter_map(|redis_key| {
                    let key = redis_key.strip_prefix(&self.config.key_prefix)?;
                    let key = RateLimitKey::from(key);
                    Some((redis_key, key))
                })
                .collect(),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Failed to scan buckets in Redis");
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

/// Drive `fut` to completion from synchronous code.
fn block_on<F: Future>(fut: F) -> Option<F::Output> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Some(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(_) => {
            tracing::warn!("Redis storage needs the multi-threaded tokio runtime");
            None
        }
        Err(_) => match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => Some(rt.block_on(fut)),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to create runtime for Redis call");
                None
            }
        },
    }
}

impl Storage<RateLimitKey, Bucket> for RedisStorage {
    /// Load the bucket, run `accessor`, and write the result back.
    ///
    /// A failed read is treated as a missing bucket; a failed write is
    /// logged and the decision still stands.
    fn with_entry_mut<F, R>(
        &self,
        key: RateLimitKey,
        factory: impl FnOnce() -> Bucket,
        accessor: F,
    ) -> R
    where
        F: FnOnce(&mut Bucket) -> R,
    {
        let stored = match block_on(self.get(&key)) {
            Some(Ok(bucket)) => bucket,
            Some(Err(err)) => {
                tracing::warn!(error = %err, key = %key, "Failed to load bucket from Redis");
                None
            }
            None => None,
        };
        let mut bucket = stored.unwrap_or_else(factory);
        let result = accessor(&mut bucket);

        if let Some(Err(err)) = block_on(self.set(&key, &bucket)) {
            tracing::warn!(error = %err, key = %key, "Failed to persist bucket to Redis");
        }
        result
    }

    fn len(&self) -> usize {
        0
    }

    fn is_empty(&self) -> bool {
        false
    }

    fn clear(&self) {
        for (redis_key, _) in self.scanned_keys() {
            if let Some(Err(err)) = block_on(self.del(&redis_key)) {
                tracing::warn!(error = %err, key = %redis_key, "Failed to delete bucket");
            }
        }
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&RateLimitKey, &Bucket),
    {
        for (_, key) in self.scanned_keys() {
            if let Some(Ok(Some(bucket))) = block_on(self.get(&key)) {
                f(&key, &bucket);
            }
        }
    }

    fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&RateLimitKey, &mut Bucket) -> bool,
    {
        for (redis_key, key) in self.scanned_keys() {
            let Some(Ok(Some(mut bucket))) = block_on(self.get(&key)) else {
                continue;
            };
            let outcome = if f(&key, &mut bucket) {
                block_on(self.set(&key, &bucket))
            } else {
                block_on(self.del(&redis_key))
            };
            if let Some(Err(err)) = outcome {
                tracing::warn!(error = %err, key = %redis_key, "Failed to update bucket during retain");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_maps_instants_to_wall_time_and_back() {
        let anchor = WallClockAnchor::now();
        let later = anchor.instant + Duration::from_millis(1_500);
        let earlier = anchor.instant.checked_sub(Duration::from_millis(250));

        let later_ms = anchor.to_epoch_ms(later);
        assert_eq!(
            later_ms - anchor.to_epoch_ms(anchor.instant),
            1_500
        );

        let back = anchor.from_epoch_ms(later_ms);
        let drift = back
            .checked_duration_since(later)
            .unwrap_or_else(|| later - back);
        assert!(drift < Duration::from_millis(1));

        if let Some(earlier) = earlier {
            assert!(anchor.to_epoch_ms(earlier) < anchor.to_epoch_ms(anchor.instant));
        }
    }

    #[test]
    fn test_stored_bucket_roundtrips_through_bincode() {
        let stored = StoredBucket {
            window_ms: 60_000,
            timestamps_ms: vec![1_700_000_000_000, 1_700_000_000_250],
        };
        let bytes = bincode::serialize(&stored).unwrap();
        assert_eq!(bincode::deserialize::<StoredBucket>(&bytes).unwrap(), stored);
    }

    #[test]
    fn test_default_config() {
        let config = RedisStorageConfig::default();
        assert_eq!(config.key_prefix, "realtor-gate:ratelimit:");
        assert_eq!(config.ttl_margin, Duration::from_secs(1));
    }
}
