//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Storage implementations (sharded maps, Redis) and eviction policies
//! - WebSocket adapters and the upstream connector
//! - The HTTP surface (axum router, auth gate, error mapping)

pub mod builder;
pub mod clock;
pub mod eviction;
pub mod http;
pub mod socket;
pub mod storage;
pub mod upstream;

#[cfg(feature = "redis-storage")]
pub mod redis_storage;

/// Mock implementations for testing.
///
/// Only available with the `test-helpers` feature or in test builds. To use
/// them from integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// realtor-gate = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
