//! Per-key request history.
//!
//! A bucket holds the instants of accepted requests for one key. Entries are
//! appended in clock order, so the front of the queue is always the oldest.

use crate::domain::policy::{PolicyDecision, RateLimitOptions};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of accepted requests for one rate limit key.
///
/// # Example
/// ```
/// use realtor_gate::{Bucket, RateLimitOptions};
/// use std::time::{Duration, Instant};
///
/// let options = RateLimitOptions::new(2, Duration::from_secs(60)).unwrap();
/// let mut bucket = Bucket::new();
/// let now = Instant::now();
///
/// assert!(bucket.register(now, &options).is_allow());
/// assert!(bucket.register(now, &options).is_allow());
/// assert!(bucket.register(now, &options).is_reject());
///
/// // Once the window has slid past, requests are admitted again
/// let later = now + Duration::from_secs(61);
/// assert!(bucket.register(later, &options).is_allow());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    timestamps: VecDeque<Instant>,
    /// Window used by the most recent check, consulted by the sweeper
    window: Duration,
}

impl Bucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a bucket from stored parts.
    ///
    /// Timestamps are sorted so the oldest-first invariant holds even if the
    /// source was not ordered.
    pub fn from_parts(window: Duration, timestamps: impl IntoIterator<Item = Instant>) -> Self {
        let mut timestamps: Vec<Instant> = timestamps.into_iter().collect();
        timestamps.sort_unstable();
        Self {
            timestamps: timestamps.into(),
            window,
        }
    }

    /// Evaluate a request at `now` and record it if admitted.
    ///
    /// Timestamps older than the window are dropped first. If the remaining
    /// count has reached the limit the request is rejected and nothing is
    /// recorded.
    pub fn register(&mut self, now: Instant, options: &RateLimitOptions) -> PolicyDecision {
        self.window = options.window();
        self.expire(now);

        let limit = options.limit() as usize;
        if self.timestamps.len() >= limit {
            return PolicyDecision::Reject {
                retry_after: self.retry_after(now, limit),
            };
        }

        self.timestamps.push_back(now);
        let remaining = limit - self.timestamps.len();
        PolicyDecision::Allow {
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        }
    }

    /// Drop timestamps that fell out of the bucket's window.
    pub fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until enough timestamps leave the window to admit one more
    /// request under `limit`.
    ///
    /// A bucket can hold more than `limit` entries when the same key was
    /// last enforced with a larger limit, so the entry that frees a slot is
    /// the one at `len - limit`, not necessarily the oldest.
    fn retry_after(&self, now: Instant, limit: usize) -> Duration {
        let blocking = self.timestamps.len().saturating_sub(limit);
        self.timestamps
            .get(blocking)
            .map(|&oldest| {
                let age = now.saturating_duration_since(oldest);
                // The entry is dropped once its age exceeds the window.
                self.window.saturating_sub(age) + Duration::from_millis(1)
            })
            .unwrap_or(Duration::ZERO)
    }

    /// Number of requests currently counted.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if no requests are counted.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Window used by the most recent check.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Iterate over the counted timestamps, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = Instant> + '_ {
        self.timestamps.iter().copied()
    }
}
