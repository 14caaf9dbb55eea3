//! Observability metrics for the rate limiter and the relay.
//!
//! Counters are atomics shared behind an `Arc`, so clones observe the same
//! values. Snapshots are serializable for the `/metrics` endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking rate limiting statistics.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Total number of requests admitted
    requests_allowed: AtomicU64,
    /// Total number of requests rejected
    requests_rejected: AtomicU64,
    /// Total number of buckets evicted from storage
    buckets_evicted: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.inner.buckets_evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of requests admitted.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Get the total number of requests rejected.
    pub fn requests_rejected(&self) -> u64 {
        self.inner.requests_rejected.load(Ordering::Relaxed)
    }

    /// Get the total number of buckets evicted.
    pub fn buckets_evicted(&self) -> u64 {
        self.inner.buckets_evicted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_rejected: self.requests_rejected(),
            buckets_evicted: self.buckets_evicted(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.requests_allowed.store(0, Ordering::Relaxed);
        self.inner.requests_rejected.store(0, Ordering::Relaxed);
        self.inner.buckets_evicted.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of rate limiter metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Total number of requests admitted
    pub requests_allowed: u64,
    /// Total number of requests rejected
    pub requests_rejected: u64,
    /// Total number of buckets evicted from storage
    pub buckets_evicted: u64,
}

impl MetricsSnapshot {
    /// Ratio of rejected requests to all requests (0.0 to 1.0).
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.requests_rejected as f64 / total as f64
        }
    }

    /// Get the total number of requests checked.
    pub fn total_requests(&self) -> u64 {
        self.requests_allowed.saturating_add(self.requests_rejected)
    }
}

/// Metrics tracking relay sessions.
#[derive(Debug, Clone, Default)]
pub struct RelayMetrics {
    inner: Arc<RelayMetricsInner>,
}

#[derive(Debug, Default)]
struct RelayMetricsInner {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    upstream_failures: AtomicU64,
    frames_to_upstream: AtomicU64,
    frames_to_client: AtomicU64,
}

impl RelayMetrics {
    /// Create a new relay metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_opened(&self) {
        self.inner.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.inner.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upstream_failure(&self) {
        self.inner.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_to_upstream(&self) {
        self.inner.frames_to_upstream.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_to_client(&self) {
        self.inner.frames_to_client.fetch_add(1, Ordering::Relaxed);
    }

    /// Sessions currently relaying.
    pub fn active_sessions(&self) -> u64 {
        let opened = self.inner.sessions_opened.load(Ordering::Relaxed);
        let closed = self.inner.sessions_closed.load(Ordering::Relaxed);
        opened.saturating_sub(closed)
    }

    /// Get a snapshot of all relay metrics.
    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            sessions_opened: self.inner.sessions_opened.load(Ordering::Relaxed),
            sessions_active: self.active_sessions(),
            upstream_failures: self.inner.upstream_failures.load(Ordering::Relaxed),
            frames_to_upstream: self.inner.frames_to_upstream.load(Ordering::Relaxed),
            frames_to_client: self.inner.frames_to_client.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of relay metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayMetricsSnapshot {
    /// Sessions that reached the relaying state
    pub sessions_opened: u64,
    /// Sessions currently relaying
    pub sessions_active: u64,
    /// Upstream connection attempts that failed
    pub upstream_failures: u64,
    /// Frames forwarded client to upstream
    pub frames_to_upstream: u64,
    /// Frames forwarded upstream to client
    pub frames_to_client: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.requests_allowed(), 0);
        assert_eq!(metrics.requests_rejected(), 0);
        assert_eq!(metrics.buckets_evicted(), 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_allowed();
        clone.record_rejected();
        metrics.record_eviction();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_allowed, 1);
        assert_eq!(snapshot.requests_rejected, 1);
        assert_eq!(clone.buckets_evicted(), 1);
    }

    #[test]
    fn test_rejection_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().rejection_rate(), 0.0);

        for _ in 0..3 {
            metrics.record_allowed();
        }
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests(), 4);
        assert!((snapshot.rejection_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_allowed();
        metrics.record_eviction();
        metrics.reset();
        assert_eq!(metrics.snapshot().total_requests(), 0);
        assert_eq!(metrics.buckets_evicted(), 0);
    }

    #[test]
    fn test_relay_active_sessions() {
        let relay = RelayMetrics::new();
        relay.record_opened();
        relay.record_opened();
        relay.record_closed();
        relay.record_frame_to_upstream();
        relay.record_frame_to_client();
        relay.record_frame_to_client();
        relay.record_upstream_failure();

        let snapshot = relay.snapshot();
        assert_eq!(snapshot.sessions_opened, 2);
        assert_eq!(snapshot.sessions_active, 1);
        assert_eq!(snapshot.frames_to_upstream, 1);
        assert_eq!(snapshot.frames_to_client, 2);
        assert_eq!(snapshot.upstream_failures, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(Metrics::new().snapshot()).unwrap();
        assert_eq!(json["requests_rejected"], 0);
    }
}
