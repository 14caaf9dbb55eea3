//! Fail-open guard around the bucket store.
//!
//! The limiter counts a store operation as failed when it panics. A store
//! that keeps panicking should not take session creation down with it:
//! after `failure_threshold` consecutive failures the breaker trips and the
//! limiter admits every request unchecked. Once `recovery_timeout` has
//! elapsed a single trial request reaches the store again; its outcome decides
//! whether the breaker closes or trips for another round.
//!
//! Redis errors never reach the breaker. `RedisStorage` logs them and
//! evaluates the request against an empty bucket instead.

use crate::application::ports::Clock;
use crate::infrastructure::clock::SystemClock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Externally visible breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests consult the store
    Closed,
    /// The store is bypassed
    Open,
    /// A single trial request is in flight; other callers bypass the store
    HalfOpen,
}

/// Thresholds for tripping and recovery.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive store failures that trip the breaker
    pub failure_threshold: u32,
    /// How long the store is bypassed before it is tried again
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Tripped { at: Instant },
    Trial,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    failures: u64,
}

/// Breaker consulted by the limiter before every store operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Breaker with the default thresholds.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Breaker with custom thresholds on the system clock.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Breaker that measures the recovery timeout against `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                failures: 0,
            }),
            config,
            clock,
        }
    }

    // A panic while holding the lock leaves plain counters behind, so a
    // poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, for metrics and tests.
    pub fn state(&self) -> CircuitState {
        match self.lock().phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Tripped { .. } => CircuitState::Open,
            Phase::Trial => CircuitState::HalfOpen,
        }
    }

    /// Whether the next operation may touch the store.
    ///
    /// A tripped breaker answers `false` until the recovery timeout has
    /// passed. The first caller after that makes the trial request and gets
    /// `true`; everyone else keeps getting `false` until that request reports
    /// back through [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Closed => true,
            Phase::Trial => false,
            Phase::Tripped { at } => {
                let bypassed_for = self.clock.now().saturating_duration_since(at);
                if bypassed_for < self.config.recovery_timeout {
                    return false;
                }
                inner.phase = Phase::Trial;
                tracing::info!(
                    bypassed_ms = bypassed_for.as_millis() as u64,
                    "Retrying bucket store"
                );
                true
            }
        }
    }

    /// Report a store operation that completed; closes a half-open breaker.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if let Phase::Tripped { .. } = inner.phase {
            return;
        }
        if let Phase::Trial = inner.phase {
            tracing::info!("Bucket store recovered, enforcing quotas again");
        }
        inner.phase = Phase::Closed;
        inner.failures = 0;
    }

    /// Report a store operation that panicked.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.failures += 1;

        match inner.phase {
            Phase::Trial => {
                inner.phase = Phase::Tripped { at: now };
                tracing::warn!("Bucket store trial request failed");
            }
            Phase::Closed if inner.failures >= u64::from(self.config.failure_threshold) => {
                inner.phase = Phase::Tripped { at: now };
                tracing::error!(
                    failures = inner.failures,
                    "Bucket store failing; admitting requests without quota checks"
                );
            }
            // Keep the original trip time so the bypass does not stretch.
            Phase::Closed | Phase::Tripped { .. } => {}
        }
    }

    /// Store failures since the last success.
    pub fn consecutive_failures(&self) -> u64 {
        self.lock().failures
    }

    /// Close the breaker and forget past failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.phase = Phase::Closed;
        inner.failures = 0;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
