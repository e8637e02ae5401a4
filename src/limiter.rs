//! Per-session request rate limiting
//!
//! One limiter per crawl session serializes fetch slots so that requests to
//! the target site are spaced at least the configured delay apart, no matter
//! how many fetch workers are running.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Spaces permits a fixed interval apart
///
/// Each `acquire` reserves the next free slot and sleeps until it arrives.
/// With a zero interval the limiter is a no-op.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(delay_ms),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Waits until the next request slot is available
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let at = {
            let mut slot = self.next_slot.lock().await;
            let at = (*slot).max(Instant::now());
            *slot = at + self.interval;
            at
        };
        sleep_until(at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_delay_does_not_block() {
        let limiter = RateLimiter::new(0);
        let start = std::time::Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_acquires_are_spaced() {
        let limiter = RateLimiter::new(50);
        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // First permit is immediate; the next two add 50ms each.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
