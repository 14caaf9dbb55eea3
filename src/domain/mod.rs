//! Domain layer - pure logic with no I/O.
//!
//! This layer contains the core concepts and invariants of the gate:
//! - Rate limit keys and per-call policies
//! - Buckets of request timestamps and the sliding-window rule
//! - Relay frames, close codes and the session state machine
//!
//! All types in this layer are pure and easily testable.

pub mod bucket;
pub mod error;
pub mod frame;
pub mod key;
pub mod policy;
pub mod session;
