//! Hand-driven time for window and breaker tests.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Manually advanced clock.
///
/// Lets tests step through a rate limit window without sleeping. Clones share
/// the same time value, so a clone handed to a registry or circuit breaker
/// moves together with the one the test holds.
///
/// ```ignore
/// use realtor_gate::infrastructure::mocks::MockClock;
/// use realtor_gate::application::ports::Clock;
/// use std::time::{Duration, Instant};
///
/// let opened = Instant::now();
/// let clock = MockClock::new(opened);
/// clock.advance(Duration::from_millis(1_001));
/// assert_eq!(clock.now(), opened + Duration::from_millis(1_001));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new(at: Instant) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    /// Advance the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    /// Jump to `at`, which may be earlier than the current reading.
    pub fn set(&self, at: Instant) {
        *self.lock() = at;
    }

    fn lock(&self) -> MutexGuard<'_, Instant> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_and_rewind() {
        let t0 = Instant::now();
        let clock = MockClock::new(t0);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now(), t0 + Duration::from_millis(250));

        clock.set(t0);
        assert_eq!(clock.now(), t0);
    }

    #[test]
    fn test_clones_share_time() {
        let t0 = Instant::now();
        let clock = MockClock::new(t0);
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());

        clock.advance(Duration::from_secs(5));
        assert_eq!(shared.now(), t0 + Duration::from_secs(5));
    }
}
