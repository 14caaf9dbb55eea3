//! # realtor-gate
//!
//! Request-path infrastructure for a real-estate marketplace backend: a
//! sliding-window rate limiter keyed by `<feature>:<identifier>`, and a relay
//! that bridges a browser WebSocket to a third-party realtime voice service.
//!
//! The crate is a library plus a small HTTP service (`realtor-gate` binary)
//! exposing both behind a shared-secret gate.
//!
//! ## Quick Start
//!
//! ```rust
//! use realtor_gate::{RateLimitKey, RateLimitOptions, RateLimiterBuilder};
//! use std::time::Duration;
//!
//! let limiter = RateLimiterBuilder::new()
//!     .with_max_buckets(10_000)
//!     .build()
//!     .unwrap();
//!
//! let options = RateLimitOptions::new(3, Duration::from_secs(1))
//!     .unwrap()
//!     .with_feature("realtime session");
//! let key = RateLimitKey::new("realtime-session", "user-42");
//!
//! for _ in 0..3 {
//!     assert!(limiter.enforce(&key, &options).is_ok());
//! }
//!
//! let err = limiter.enforce(&key, &options).unwrap_err();
//! assert_eq!(err.status(), 429);
//! assert_eq!(err.code(), "RATE_LIMITED");
//! ```
//!
//! ## Sliding Windows
//!
//! Each key owns a bucket of the instants at which requests were admitted.
//! A check first drops instants older than the window, then rejects if the
//! bucket still holds `limit` entries. Rejected requests are not recorded, so
//! a client retrying against a full bucket does not extend its own wait;
//! `retry_after` is the time until the oldest counted request leaves the
//! window.
//!
//! Options are passed per call, so one limiter can serve every feature:
//!
//! ```rust
//! # use realtor_gate::{RateLimitOptions, RateLimiterBuilder};
//! let limiter = RateLimiterBuilder::new().build().unwrap();
//! let search = RateLimitOptions::from_millis(30, 60_000).unwrap();
//! let session = RateLimitOptions::from_millis(3, 60_000).unwrap();
//!
//! limiter.enforce("listing-search:10.0.0.1", &search).unwrap();
//! limiter.enforce("realtime-session:10.0.0.1", &session).unwrap();
//! assert_eq!(limiter.registry().len(), 2);
//! ```
//!
//! ## Memory Management
//!
//! The bucket store is owned by the limiter and bounded. By default it keeps
//! at most 10 000 buckets and evicts the least recently used one when full.
//! A memory bound is also available:
//!
//! ```rust
//! # use realtor_gate::RateLimiterBuilder;
//! let limiter = RateLimiterBuilder::new()
//!     .with_memory_limit(4 * 1024 * 1024)
//!     .build()
//!     .unwrap();
//! ```
//!
//! Buckets whose requests have all aged out are removed by a background
//! sweeper:
//!
//! ```rust,no_run
//! # use realtor_gate::{RateLimiterBuilder, SweeperConfig};
//! # use std::time::Duration;
//! # async fn run() {
//! let limiter = RateLimiterBuilder::new().build().unwrap();
//! let sweeper = limiter
//!     .sweeper(SweeperConfig::new(Duration::from_secs(30)).unwrap())
//!     .start();
//!
//! // ... serve requests ...
//!
//! sweeper.shutdown().await.unwrap();
//! # }
//! ```
//!
//! `with_unlimited_buckets()` removes the bound. Only use it when the set of
//! identifiers is known to be finite (authenticated users, internal callers):
//! with client addresses as identifiers it grows without limit between sweeps.
//!
//! Across several instances, enable the `redis-storage` feature and build the
//! limiter over `RedisStorage`; buckets then expire in Redis after their
//! window.
//!
//! ## Fail-Open
//!
//! If the bucket store panics, the request is admitted and the failure is
//! counted by a circuit breaker. After repeated failures the breaker opens and
//! requests bypass the store entirely until a trial request succeeds. Rate
//! limiting degrades to "off" rather than taking the marketplace down.
//!
//! ## Realtime Relay
//!
//! [`RelaySession`] pairs a client socket with an upstream socket and
//! forwards text and binary frames verbatim in both directions until either
//! side closes, fails or disconnects. The close is then propagated:
//!
//! | First event | Close sent to both sides |
//! |-------------|--------------------------|
//! | close frame from a peer | the same code and reason |
//! | socket error | `1011` |
//! | stream ended without close | `1001` |
//!
//! The HTTP handler connects to the upstream before accepting the client's
//! upgrade, so an unreachable upstream is reported as `502` and no client
//! socket is left open.
//!
//! ## Observability
//!
//! All components log through `tracing`. The binary installs a
//! `tracing-subscriber` fmt layer filtered by `RUST_LOG`. Counters are
//! available programmatically and on `GET /metrics`:
//!
//! ```rust
//! # use realtor_gate::{RateLimitOptions, RateLimiterBuilder};
//! let limiter = RateLimiterBuilder::new().build().unwrap();
//! let options = RateLimitOptions::from_millis(1, 60_000).unwrap();
//! let _ = limiter.enforce("k", &options);
//! let _ = limiter.enforce("k", &options);
//!
//! let snapshot = limiter.metrics().snapshot();
//! assert_eq!(snapshot.requests_allowed, 1);
//! assert_eq!(snapshot.requests_rejected, 1);
//! assert_eq!(snapshot.rejection_rate(), 0.5);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Service configuration
pub mod config;

// Re-export commonly used types for convenience
pub use domain::{
    bucket::Bucket,
    error::{RateLimitError, RelayError, RATE_LIMITED_CODE, RATE_LIMITED_STATUS},
    frame::{close_code, CloseFrame, Frame},
    key::RateLimitKey,
    policy::{PolicyDecision, PolicyError, RateLimitOptions},
    session::{SessionId, SessionState, Side, Termination},
};

pub use application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    limiter::{Admission, RateLimiter, RequestLimiter},
    metrics::{Metrics, MetricsSnapshot, RelayMetrics, RelayMetricsSnapshot},
    ports::{
        BoxedSocket, Clock, EvictionCandidate, EvictionPolicy, FrameSocket, Storage,
        UpstreamConnector,
    },
    registry::BucketRegistry,
    relay::RelaySession,
    sweeper::{BucketSweeper, ShutdownError, SweeperConfig, SweeperConfigError, SweeperHandle},
};

pub use infrastructure::{
    builder::{BuildError, EvictionStrategy, RateLimiterBuilder},
    clock::SystemClock,
    eviction::{LruEviction, MemoryEviction},
    storage::ShardedStorage,
    upstream::TungsteniteConnector,
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisStorage, RedisStorageConfig};
