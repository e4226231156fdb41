//! Backoff policy and the shared rate-limit counter.

use parking_lot::Mutex;
use std::time::Duration;

use crate::config::Retry;

/// Upper bound of the rate-limit counter.
pub const MAX_RATE_LIMIT_COUNT: u8 = 10;

const JITTER_RATIO: f64 = 0.1;

/// Delays applied between failed attempts.
///
/// Rate-limited failures wait `min(throttle_cap, throttle_floor + throttle_span * counter / 10)`;
/// transient failures wait `min(backoff_step * attempt, backoff_cap)` and give up once
/// `horizon` has elapsed since the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub throttle_floor: Duration,
    pub throttle_span: Duration,
    pub throttle_cap: Duration,
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
    pub horizon: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            throttle_floor: Duration::from_secs(10),
            throttle_span: Duration::from_secs(290),
            throttle_cap: Duration::from_secs(300),
            backoff_step: Duration::from_secs(10),
            backoff_cap: Duration::from_secs(15 * 60),
            horizon: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl RetryPolicy {
    /// Builds a policy from configuration, keeping defaults for unset values.
    pub fn from_cfg(cfg: Option<&Retry>) -> Self {
        let d = Self::default();
        let Some(cfg) = cfg else {
            return d;
        };
        Self {
            throttle_floor: cfg.throttle_floor.unwrap_or(d.throttle_floor),
            throttle_span: cfg.throttle_span.unwrap_or(d.throttle_span),
            throttle_cap: cfg.throttle_cap.unwrap_or(d.throttle_cap),
            backoff_step: cfg.backoff_step.unwrap_or(d.backoff_step),
            backoff_cap: cfg.backoff_cap.unwrap_or(d.backoff_cap),
            horizon: cfg.horizon.unwrap_or(d.horizon),
        }
    }

    /// Sleep before retrying a rate-limited call.
    pub fn throttle_delay(&self, counter: u8) -> Duration {
        let counter = counter.min(MAX_RATE_LIMIT_COUNT) as f64;
        let delay = self.throttle_floor.as_secs_f64()
            + counter / MAX_RATE_LIMIT_COUNT as f64 * self.throttle_span.as_secs_f64();
        Duration::from_secs_f64(delay.abs()).min(self.throttle_cap)
    }

    /// Sleep before retrying a transient failure; `attempt` starts at 0.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_step
            .checked_mul(attempt)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    /// True once transient retries must stop.
    pub fn is_expired(&self, elapsed: Duration) -> bool {
        elapsed >= self.horizon
    }
}

/// Spreads `delay` by ±10%; `sample` is uniform in [0, 1).
pub fn jitter(delay: Duration, sample: f64) -> Duration {
    let secs = delay.as_secs_f64();
    let spread = sample * secs * 2.0 * JITTER_RATIO - secs * JITTER_RATIO;
    Duration::from_secs_f64((secs + spread).max(0.0))
}

/// Process-wide throttling signal shared by every call of one transport.
/// Bounded to [0, 10]; the lock is held only for the update.
#[derive(Debug, Default)]
pub struct RateLimitCounter {
    value: Mutex<u8>,
}

impl RateLimitCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u8 {
        *self.value.lock()
    }

    /// Registers a retryable failure.
    pub fn increment(&self) -> u8 {
        let mut value = self.value.lock();
        if *value < MAX_RATE_LIMIT_COUNT {
            *value += 1;
        }
        *value
    }

    /// Registers a success.
    pub fn decrement(&self) -> u8 {
        let mut value = self.value.lock();
        if *value > 0 {
            *value -= 1;
        }
        *value
    }
}
