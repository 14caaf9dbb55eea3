//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Bucket registry (storage of request timestamps)
//! - Rate limiter (admission decisions)
//! - Sweeper (periodic removal of idle buckets)
//! - Relay sessions (frame forwarding between client and upstream)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod relay;
pub mod sweeper;
