//! Pacing for mutating platform calls
//!
//! Platforms throttle bursts of deletes far more aggressively than reads, so
//! every live action waits a fixed delay first, including the very first one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::trace;

/// Fixed-delay limiter for mutating calls
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    throttled: AtomicU64,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            throttled: AtomicU64::new(0),
        }
    }

    /// Wait out the configured delay before the next call
    pub async fn throttle(&self) {
        if !self.delay.is_zero() {
            trace!(delay_ms = self.delay.as_millis() as u64, "Throttling before action");
            sleep(self.delay).await;
        }
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of calls that have passed through [`RateLimiter::throttle`]
    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_waits_full_delay_every_call() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();

        limiter.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        limiter.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(limiter.throttled(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_does_not_sleep() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let start = Instant::now();

        for _ in 0..10 {
            limiter.throttle().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.throttled(), 10);
    }
}
