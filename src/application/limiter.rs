//! Quota enforcement on top of the bucket registry.
//!
//! The rate limiter evaluates a request against the bucket for its key and
//! decides whether to admit or reject it, recording the outcome in metrics.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::metrics::Metrics;
use crate::application::ports::Storage;
use crate::application::registry::BucketRegistry;
use crate::application::sweeper::{BucketSweeper, SweeperConfig};
use crate::domain::{
    bucket::Bucket,
    error::RateLimitError,
    key::RateLimitKey,
    policy::{PolicyDecision, RateLimitOptions},
};
use crate::infrastructure::storage::ShardedStorage;
use std::panic;
use std::sync::Arc;

/// Quota information for an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Configured limit per window
    pub limit: u32,
    /// Requests still available in the current window
    pub remaining: u32,
}

/// Seam between request handlers and a concrete limiter.
///
/// Handlers hold an `Arc<dyn RequestLimiter>` so the storage backend stays a
/// deployment decision.
pub trait RequestLimiter: Send + Sync {
    /// Admit the request or fail with a `RateLimitError`.
    ///
    /// # Errors
    /// Returns `RateLimitError::TooManyRequests` when `key` is over its limit.
    fn enforce(
        &self,
        key: &RateLimitKey,
        options: &RateLimitOptions,
    ) -> Result<Admission, RateLimitError>;

    /// Metrics recorded by this limiter.
    fn metrics(&self) -> &Metrics;

    /// Number of buckets currently tracked (0 if the backend cannot count).
    fn bucket_count(&self) -> usize;
}

/// Enforces sliding-window quotas on keys.
#[derive(Clone)]
pub struct RateLimiter<S = Arc<ShardedStorage<RateLimitKey, Bucket>>>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    registry: BucketRegistry<S>,
    metrics: Metrics,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl<S> RateLimiter<S>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `registry` - The bucket registry (which contains the clock)
    /// * `metrics` - Admission counters, shared with the storage
    /// * `circuit_breaker` - Circuit breaker guarding the store
    pub fn new(
        registry: BucketRegistry<S>,
        metrics: Metrics,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            registry,
            metrics,
            circuit_breaker,
        }
    }

    /// Register a request for `key` and decide whether to admit it.
    ///
    /// Rejected requests are not recorded, so a caller hammering a full
    /// bucket does not push its own retry time further out.
    ///
    /// # Fail-Open Behavior
    /// If the store panics, or the circuit breaker is open, the request is
    /// admitted with the full limit reported as remaining.
    pub fn check(&self, key: RateLimitKey, options: &RateLimitOptions) -> PolicyDecision {
        let fail_open = PolicyDecision::Allow {
            remaining: options.limit(),
        };

        if !self.circuit_breaker.allow_request() {
            self.metrics.record_allowed();
            return fail_open;
        }

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.registry
                .with_bucket(key, |bucket, now| bucket.register(now, options))
        }));

        let decision = match result {
            Ok(decision) => {
                self.circuit_breaker.record_success();
                decision
            }
            Err(_) => {
                self.circuit_breaker.record_failure();
                tracing::error!("Bucket store panicked, admitting request");
                fail_open
            }
        };

        match decision {
            PolicyDecision::Allow { .. } => self.metrics.record_allowed(),
            PolicyDecision::Reject { .. } => self.metrics.record_rejected(),
        }

        decision
    }

    /// Admit the request for `key` or return the error the caller should
    /// respond with.
    ///
    /// # Errors
    /// Returns `RateLimitError::TooManyRequests` when `key` already has
    /// `options.limit()` requests inside the window.
    pub fn enforce(
        &self,
        key: impl Into<RateLimitKey>,
        options: &RateLimitOptions,
    ) -> Result<Admission, RateLimitError> {
        let key = key.into();
        match self.check(key.clone(), options) {
            PolicyDecision::Allow { remaining } => Ok(Admission {
                limit: options.limit(),
                remaining,
            }),
            PolicyDecision::Reject { retry_after } => {
                tracing::warn!(
                    key = %key,
                    limit = options.limit(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Err(RateLimitError::TooManyRequests {
                    key,
                    feature: options.feature().map(str::to_owned),
                    limit: options.limit(),
                    retry_after,
                })
            }
        }
    }

    /// Buckets behind this limiter.
    pub fn registry(&self) -> &BucketRegistry<S> {
        &self.registry
    }

    /// Admission counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Guard around the bucket store.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Create a sweeper that prunes idle buckets from this limiter's store.
    pub fn sweeper(&self, config: SweeperConfig) -> BucketSweeper<S> {
        BucketSweeper::new(self.registry.clone(), config)
    }
}

impl<S> RequestLimiter for RateLimiter<S>
where
    S: Storage<RateLimitKey, Bucket> + Clone,
{
    fn enforce(
        &self,
        key: &RateLimitKey,
        options: &RateLimitOptions,
    ) -> Result<Admission, RateLimitError> {
        RateLimiter::<S>::enforce(self, key, options)
    }

    fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn bucket_count(&self) -> usize {
        self.registry.len()
    }
}
