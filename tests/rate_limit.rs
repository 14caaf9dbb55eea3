//! Rate limiter behaviour through the public API.

use realtor_gate::infrastructure::mocks::MockClock;
use realtor_gate::{
    EvictionStrategy, RateLimitError, RateLimitKey, RateLimitOptions, RateLimiterBuilder,
    RequestLimiter, SweeperConfig,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn options(limit: u32, window_ms: u64) -> RateLimitOptions {
    RateLimitOptions::from_millis(limit, window_ms).unwrap()
}

#[test]
fn test_fourth_call_in_window_is_rejected() {
    let limiter = RateLimiterBuilder::new().build().unwrap();
    let opts = options(3, 1_000);

    for expected_remaining in [2, 1, 0] {
        let admission = limiter.enforce("k", &opts).unwrap();
        assert_eq!(admission.limit, 3);
        assert_eq!(admission.remaining, expected_remaining);
    }

    let err = limiter.enforce("k", &opts).unwrap_err();
    assert_eq!(err.status(), 429);
    assert_eq!(err.code(), "RATE_LIMITED");
    assert!(err.retry_after() <= Duration::from_millis(1_001));
}

#[test]
fn test_window_slides() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiterBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    let opts = options(2, 1_000);

    limiter.enforce("k", &opts).unwrap();
    clock.advance(Duration::from_millis(600));
    limiter.enforce("k", &opts).unwrap();

    let err = limiter.enforce("k", &opts).unwrap_err();
    assert_eq!(err.retry_after(), Duration::from_millis(401));

    // Exactly one window after the first request it still counts.
    clock.advance(Duration::from_millis(400));
    assert!(limiter.enforce("k", &opts).is_err());

    // One millisecond later it has left the window; only the second remains.
    clock.advance(Duration::from_millis(1));
    let admission = limiter.enforce("k", &opts).unwrap();
    assert_eq!(admission.remaining, 0);
}

#[test]
fn test_quiet_period_resets_quota() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiterBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    let opts = options(3, 1_000);

    for _ in 0..3 {
        limiter.enforce("k", &opts).unwrap();
    }
    assert!(limiter.enforce("k", &opts).is_err());

    clock.advance(Duration::from_millis(1_001));
    assert_eq!(limiter.enforce("k", &opts).unwrap().remaining, 2);
}

#[test]
fn test_keys_are_independent() {
    let limiter = RateLimiterBuilder::new().build().unwrap();
    let opts = options(1, 60_000);

    let alice = RateLimitKey::new("realtime-session", "alice");
    let bob = RateLimitKey::new("realtime-session", "bob");
    let alice_search = RateLimitKey::new("listing-search", "alice");

    limiter.enforce(&alice, &opts).unwrap();
    assert!(limiter.enforce(&alice, &opts).is_err());
    assert!(limiter.enforce(&bob, &opts).is_ok());
    assert!(limiter.enforce(&alice_search, &opts).is_ok());
}

#[test]
fn test_rejection_carries_context() {
    let limiter = RateLimiterBuilder::new().build().unwrap();
    let opts = options(1, 60_000).with_feature("realtime session");

    limiter.enforce("realtime-session:u1", &opts).unwrap();
    let err = limiter.enforce("realtime-session:u1", &opts).unwrap_err();

    let RateLimitError::TooManyRequests {
        key,
        feature,
        limit,
        ..
    } = &err;
    assert_eq!(key.as_str(), "realtime-session:u1");
    assert_eq!(feature.as_deref(), Some("realtime session"));
    assert_eq!(*limit, 1);
    assert!(err.to_string().starts_with("too many realtime session requests"));
}

#[test]
fn test_concurrent_callers_share_quota() {
    let limiter = Arc::new(RateLimiterBuilder::new().build().unwrap());
    let opts = options(100, 60_000);
    let admitted = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let opts = opts.clone();
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                for _ in 0..50 {
                    if limiter.enforce("shared", &opts).is_ok() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::Relaxed), 100);
    assert_eq!(limiter.metrics().requests_allowed(), 100);
    assert_eq!(limiter.metrics().requests_rejected(), 300);
}

#[test]
fn test_lru_bound_counts_evictions() {
    let limiter = RateLimiterBuilder::new()
        .with_eviction_strategy(EvictionStrategy::Lru { max_entries: 10 })
        .build()
        .unwrap();
    let opts = options(5, 60_000);

    for i in 0..25 {
        limiter
            .enforce(RateLimitKey::new("ip", &format!("10.0.0.{i}")), &opts)
            .unwrap();
    }

    assert_eq!(limiter.registry().len(), 10);
    assert_eq!(limiter.metrics().buckets_evicted(), 15);
}

#[test]
fn test_lru_recency_follows_limiter_clock() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiterBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .with_eviction_strategy(EvictionStrategy::Lru { max_entries: 2 })
        .build()
        .unwrap();
    let opts = options(2, 60_000);

    limiter.enforce("a", &opts).unwrap();
    clock.advance(Duration::from_secs(1));
    limiter.enforce("b", &opts).unwrap();
    clock.advance(Duration::from_secs(1));
    limiter.enforce("a", &opts).unwrap();
    clock.advance(Duration::from_secs(1));

    // "b" was enforced against longest ago on the limiter's clock.
    limiter.enforce("c", &opts).unwrap();
    assert_eq!(limiter.metrics().buckets_evicted(), 1);

    // "a" kept its history and is now full.
    assert!(limiter.enforce("a", &opts).is_err());
}

#[test]
fn test_trait_object_enforces() {
    let limiter: Arc<dyn RequestLimiter> = Arc::new(RateLimiterBuilder::new().build().unwrap());
    let opts = options(1, 60_000);
    let key = RateLimitKey::from("k");

    assert!(limiter.enforce(&key, &opts).is_ok());
    assert!(limiter.enforce(&key, &opts).is_err());
    assert_eq!(limiter.bucket_count(), 1);
    assert_eq!(limiter.metrics().snapshot().total_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_drops_expired_buckets() {
    let clock = MockClock::new(Instant::now());
    let limiter = RateLimiterBuilder::new()
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    limiter.enforce("short:a", &options(1, 100)).unwrap();
    limiter.enforce("long:a", &options(1, 10_000)).unwrap();
    assert_eq!(limiter.registry().len(), 2);

    let handle = limiter
        .sweeper(SweeperConfig::new(Duration::from_secs(1)).unwrap())
        .start();

    clock.advance(Duration::from_millis(500));
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    assert_eq!(limiter.registry().len(), 1);
    handle.shutdown().await.unwrap();
}
