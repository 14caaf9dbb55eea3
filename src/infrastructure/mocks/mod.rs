//! Test doubles: a hand-driven clock, an in-memory frame socket and a
//! tracing layer that records events.

pub mod clock;
pub mod layer;
pub mod socket;

pub use clock::MockClock;
pub use layer::MockCaptureLayer;
pub use socket::{MockPeer, MockSocket};
