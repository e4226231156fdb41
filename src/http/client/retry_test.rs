#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::http::client::retry::{jitter, RateLimitCounter, RetryPolicy, MAX_RATE_LIMIT_COUNT};

    #[test]
    fn test_throttle_delay_follows_counter() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.throttle_delay(0), Duration::from_secs(10));
        assert_eq!(policy.throttle_delay(5), Duration::from_secs(155));
        assert_eq!(policy.throttle_delay(10), Duration::from_secs(300));
        // counter values above the cap are clamped
        assert_eq!(policy.throttle_delay(42), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_is_monotonic_and_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(10));

        let mut prev = Duration::ZERO;
        for attempt in 0..200 {
            let d = policy.backoff_delay(attempt);
            assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
            assert!(d <= Duration::from_secs(900));
            prev = d;
        }
        assert_eq!(policy.backoff_delay(90), Duration::from_secs(900));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_secs(900));
    }

    #[test]
    fn test_jitter_band() {
        let delay = Duration::from_secs(100);
        assert_eq!(jitter(delay, 0.0), Duration::from_secs(90));
        assert_eq!(jitter(delay, 0.5), Duration::from_secs(100));
        for i in 0..100 {
            let d = jitter(delay, i as f64 / 100.0);
            assert!(d >= Duration::from_secs(90) && d < Duration::from_secs(110));
        }
        assert_eq!(jitter(Duration::ZERO, 0.7), Duration::ZERO);
    }

    #[test]
    fn test_horizon() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_expired(Duration::from_secs(6 * 24 * 3600)));
        assert!(policy.is_expired(Duration::from_secs(7 * 24 * 3600)));
    }

    #[test]
    fn test_counter_stays_in_bounds() {
        let counter = RateLimitCounter::new();
        assert_eq!(counter.decrement(), 0);
        for _ in 0..25 {
            counter.increment();
        }
        assert_eq!(counter.get(), MAX_RATE_LIMIT_COUNT);
        for _ in 0..3 {
            counter.decrement();
        }
        assert_eq!(counter.get(), 7);
        for _ in 0..25 {
            counter.decrement();
        }
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_counter_concurrent_updates() {
        let counter = Arc::new(RateLimitCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            counter.increment();
                        } else {
                            counter.decrement();
                        }
                        let v = counter.get();
                        assert!(v <= MAX_RATE_LIMIT_COUNT);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(counter.get() <= MAX_RATE_LIMIT_COUNT);
    }
}
