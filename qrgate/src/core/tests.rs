use super::{LimitError, PeriodicStore, ProbabilisticStore, RateLimiter, WindowPolicy};
use std::time::{Duration, SystemTime};

#[test]
fn test_first_call_opens_window() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());

    let now = SystemTime::now();
    let (allowed, result) = limiter
        .check("generate:10.0.0.1", WindowPolicy::per_minute(5), now)
        .unwrap();
    assert!(allowed);
    assert_eq!(result.limit, 5);
    assert_eq!(result.remaining, 4);
    assert_eq!(result.retry_after, Duration::ZERO);
    assert_eq!(result.reset_after, Duration::from_secs(60));
    assert_eq!(limiter.tracked_keys(), 1);
}

#[test]
fn test_five_admitted_sixth_rejected() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for i in 0..5 {
        let at = now + Duration::from_secs(i);
        let (allowed, result) = limiter.check("decode:10.0.0.1", policy, at).unwrap();
        assert!(allowed, "Call {} should be admitted", i + 1);
        assert_eq!(result.remaining, 4 - i);
    }

    let at = now + Duration::from_secs(10);
    let (allowed, result) = limiter.check("decode:10.0.0.1", policy, at).unwrap();
    assert!(!allowed);
    assert_eq!(result.remaining, 0);
    assert_eq!(result.retry_after, Duration::from_secs(50));
    assert_eq!(result.reset_after, Duration::from_secs(50));
}

#[test]
fn test_rejections_do_not_extend_window() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for _ in 0..5 {
        assert!(limiter.check("ocr:10.0.0.1", policy, now).unwrap().0);
    }

    // Hammer the closed window right up to its end
    for secs in [1, 20, 40, 59] {
        let (allowed, result) = limiter
            .check("ocr:10.0.0.1", policy, now + Duration::from_secs(secs))
            .unwrap();
        assert!(!allowed);
        assert_eq!(result.retry_after, Duration::from_secs(60 - secs));
    }

    // Exactly one period after the window opened a new one starts
    let (allowed, result) = limiter
        .check("ocr:10.0.0.1", policy, now + Duration::from_secs(60))
        .unwrap();
    assert!(allowed);
    assert_eq!(result.remaining, 4);
}

#[test]
fn test_window_resets_after_period() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for _ in 0..6 {
        limiter.check("generate:10.0.0.1", policy, now).unwrap();
    }

    let later = now + Duration::from_secs(61);
    let (allowed, result) = limiter.check("generate:10.0.0.1", policy, later).unwrap();
    assert!(allowed);
    assert_eq!(result.remaining, 4, "fresh window starts with a count of 1");
    assert_eq!(result.reset_after, Duration::from_secs(60));
}

#[test]
fn test_window_resets_after_retention_passed() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for _ in 0..5 {
        limiter.check("generate:10.0.0.1", policy, now).unwrap();
    }

    // Long idle: the stored window has expired outright
    let much_later = now + Duration::from_secs(3600);
    let (allowed, result) = limiter
        .check("generate:10.0.0.1", policy, much_later)
        .unwrap();
    assert!(allowed);
    assert_eq!(result.remaining, 4);
}

#[test]
fn test_clients_do_not_share_state() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for _ in 0..5 {
        assert!(limiter.check("generate:client-a", policy, now).unwrap().0);
    }
    assert!(!limiter.check("generate:client-a", policy, now).unwrap().0);

    let (allowed, result) = limiter.check("generate:client-b", policy, now).unwrap();
    assert!(allowed);
    assert_eq!(result.remaining, 4);
}

#[test]
fn test_endpoint_classes_are_independent() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for _ in 0..5 {
        limiter.check("generate:10.0.0.1", policy, now).unwrap();
    }
    assert!(!limiter.check("generate:10.0.0.1", policy, now).unwrap().0);
    assert!(limiter.check("decode:10.0.0.1", policy, now).unwrap().0);
    assert!(limiter.check("ocr:10.0.0.1", policy, now).unwrap().0);
}

#[test]
fn test_invalid_policy() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let now = SystemTime::now();

    let result = limiter.check("k", WindowPolicy::new(0, Duration::from_secs(60)), now);
    assert_eq!(result.unwrap_err(), LimitError::InvalidPolicy);

    let result = limiter.check("k", WindowPolicy::new(5, Duration::ZERO), now);
    assert_eq!(result.unwrap_err(), LimitError::InvalidPolicy);
}

#[test]
fn test_clock_going_backwards_keeps_window() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(2);
    let now = SystemTime::now();

    limiter.check("k", policy, now).unwrap();
    limiter.check("k", policy, now).unwrap();

    let earlier = now - Duration::from_secs(5);
    let (allowed, _) = limiter.check("k", policy, earlier).unwrap();
    assert!(!allowed);
}

#[test]
fn test_sweep_reclaims_idle_clients() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    for i in 0..50 {
        limiter
            .check(&format!("generate:10.0.0.{i}"), policy, now)
            .unwrap();
    }
    assert_eq!(limiter.tracked_keys(), 50);

    // Still within twice the window: nothing reclaimed
    assert_eq!(limiter.sweep(now + Duration::from_secs(90)), 0);

    // Past twice the window: everything reclaimed
    assert_eq!(limiter.sweep(now + Duration::from_secs(120)), 50);
    assert_eq!(limiter.tracked_keys(), 0);
}

#[test]
fn test_window_survives_until_twice_the_period() {
    let mut limiter = RateLimiter::new(PeriodicStore::new());
    let policy = WindowPolicy::per_minute(5);
    let now = SystemTime::now();

    limiter.check("k", policy, now).unwrap();
    // Counting inside the window does not push expiry past start + 2 * period
    limiter.check("k", policy, now + Duration::from_secs(50)).unwrap();

    assert_eq!(limiter.sweep(now + Duration::from_secs(119)), 0);
    assert_eq!(limiter.sweep(now + Duration::from_secs(120)), 1);
}

#[test]
fn test_probabilistic_store_limits_identically() {
    let mut limiter = RateLimiter::new(ProbabilisticStore::new());
    let policy = WindowPolicy::per_minute(3);
    let now = SystemTime::now();

    let admitted = (0..10)
        .filter(|_| limiter.check("k", policy, now).unwrap().0)
        .count();
    assert_eq!(admitted, 3);
}
