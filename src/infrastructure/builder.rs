//! Construction of a configured [`RateLimiter`].

use crate::application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    limiter::RateLimiter,
    metrics::Metrics,
    ports::{Clock, EvictionPolicy, Storage},
    registry::BucketRegistry,
};
use crate::domain::{bucket::Bucket, key::RateLimitKey};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::{LruEviction, MemoryEviction};
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;

/// Default bound on the number of buckets kept in process.
pub const DEFAULT_MAX_BUCKETS: usize = 10_000;

/// Invalid store bounds passed to [`RateLimiterBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// An LRU bound of zero buckets
    #[error("max_buckets must be greater than 0")]
    ZeroMaxBuckets,
    /// A byte budget of zero
    #[error("memory limit must be greater than 0")]
    ZeroMemoryLimit,
}

/// How the in-process store is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionStrategy {
    /// Keep at most `max_entries` buckets, dropping the least recently used.
    Lru {
        /// Maximum number of buckets
        max_entries: usize,
    },
    /// Keep estimated bucket memory under `max_bytes`.
    Memory {
        /// Byte budget for all buckets
        max_bytes: usize,
    },
}

impl EvictionStrategy {
    fn into_policy(self) -> Arc<dyn EvictionPolicy<RateLimitKey, Bucket>> {
        match self {
            EvictionStrategy::Lru { max_entries } => Arc::new(LruEviction::new(max_entries)),
            EvictionStrategy::Memory { max_bytes } => Arc::new(MemoryEviction::new(max_bytes)),
        }
    }
}

/// Builder for a [`RateLimiter`].
///
/// ```
/// use realtor_gate::{RateLimiterBuilder, RateLimitOptions};
///
/// let limiter = RateLimiterBuilder::new().with_max_buckets(1_000).build().unwrap();
/// let options = RateLimitOptions::from_millis(3, 1_000).unwrap();
/// assert!(limiter.enforce("listing-search:10.0.0.1", &options).is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiterBuilder {
    clock: Option<Arc<dyn Clock>>,
    eviction: Option<EvictionStrategy>,
    circuit_breaker: CircuitBreakerConfig,
    metrics: Option<Metrics>,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterBuilder {
    /// Start from the defaults: system clock and an LRU bound of
    /// [`DEFAULT_MAX_BUCKETS`].
    pub fn new() -> Self {
        Self {
            clock: None,
            eviction: Some(EvictionStrategy::Lru {
                max_entries: DEFAULT_MAX_BUCKETS,
            }),
            circuit_breaker: CircuitBreakerConfig::default(),
            metrics: None,
        }
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Bound the number of tracked buckets.
    ///
    /// The value is validated when `build()` is called.
    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.eviction = Some(EvictionStrategy::Lru {
            max_entries: max_buckets,
        });
        self
    }

    /// Bound the estimated memory of tracked buckets.
    pub fn with_memory_limit(mut self, max_bytes: usize) -> Self {
        self.eviction = Some(EvictionStrategy::Memory { max_bytes });
        self
    }

    /// Set the eviction strategy directly.
    pub fn with_eviction_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction = Some(strategy);
        self
    }

    /// Disable the bucket bound.
    ///
    /// Only safe when callers are authenticated or otherwise finite; one
    /// bucket is kept per distinct key until the sweeper removes it.
    pub fn with_unlimited_buckets(mut self) -> Self {
        self.eviction = None;
        self
    }

    /// Configure the circuit breaker guarding the store.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Share an existing metrics tracker.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        match self.eviction {
            Some(EvictionStrategy::Lru { max_entries: 0 }) => Err(BuildError::ZeroMaxBuckets),
            Some(EvictionStrategy::Memory { max_bytes: 0 }) => Err(BuildError::ZeroMemoryLimit),
            _ => Ok(()),
        }
    }

    fn parts(&self) -> (Arc<dyn Clock>, Metrics, Arc<CircuitBreaker>) {
        let clock = self
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let metrics = self.metrics.clone().unwrap_or_default();
        let circuit_breaker = Arc::new(CircuitBreaker::with_clock(
            self.circuit_breaker.clone(),
            Arc::clone(&clock),
        ));
        (clock, metrics, circuit_breaker)
    }

    /// Build an in-process rate limiter.
    ///
    /// # Errors
    /// Returns `BuildError` if the configured bound is zero.
    pub fn build(self) -> Result<RateLimiter, BuildError> {
        self.validate()?;
        let (clock, metrics, circuit_breaker) = self.parts();

        let mut storage = ShardedStorage::new()
            .with_metrics(metrics.clone())
            .with_clock(Arc::clone(&clock));
        if let Some(strategy) = self.eviction {
            storage = storage.with_eviction_policy(strategy.into_policy());
        }

        let registry = BucketRegistry::new(Arc::new(storage), clock);
        Ok(RateLimiter::new(registry, metrics, circuit_breaker))
    }

    /// Build a rate limiter over an external store such as `RedisStorage`.
    ///
    /// The eviction strategy does not apply; external stores bound
    /// themselves (Redis expires idle buckets by TTL).
    ///
    /// # Errors
    /// Returns `BuildError` if the configured bound is zero.
    pub fn build_with_storage<S>(self, storage: S) -> Result<RateLimiter<S>, BuildError>
    where
        S: Storage<RateLimitKey, Bucket> + Clone,
    {
        self.validate()?;
        let (clock, metrics, circuit_breaker) = self.parts();
        let registry = BucketRegistry::new(storage, clock);
        Ok(RateLimiter::new(registry, metrics, circuit_breaker))
    }
}
