//! Engine-wide order budget

use governor::{DefaultDirectRateLimiter, Quota};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome of asking for one emission token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Token available immediately
    Granted,
    /// Token obtained after waiting
    Delayed,
    /// No token within the wait bound; the signal must be dropped and counted
    Dropped,
}

impl RateDecision {
    pub fn is_permitted(self) -> bool {
        !matches!(self, RateDecision::Dropped)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitStats {
    pub granted: u64,
    pub delayed: u64,
    pub dropped: u64,
}

/// Token bucket shared by all workers: `max_orders_per_second` refill with
/// an equal burst.
pub struct OrderRateLimiter {
    limiter: DefaultDirectRateLimiter,
    per_second: NonZeroU32,
    max_wait: Duration,
    granted: AtomicU64,
    delayed: AtomicU64,
    dropped: AtomicU64,
}

impl OrderRateLimiter {
    pub fn new(orders_per_second: u32, max_wait: Duration) -> Self {
        let per_second = NonZeroU32::try_from(orders_per_second).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid order rate {}; falling back to 1/s",
                orders_per_second
            );
            nonzero!(1u32)
        });
        let quota = Quota::per_second(per_second).allow_burst(per_second);
        Self {
            limiter: DefaultDirectRateLimiter::direct(quota),
            per_second,
            max_wait,
            granted: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn per_second(&self) -> u32 {
        self.per_second.get()
    }

    /// Take one token, waiting at most `max_wait`.
    ///
    /// Exactly one counter moves per call. A timed-out wait consumes nothing.
    pub async fn acquire(&self) -> RateDecision {
        if self.limiter.check().is_ok() {
            self.granted.fetch_add(1, Ordering::Relaxed);
            return RateDecision::Granted;
        }

        match tokio::time::timeout(self.max_wait, self.limiter.until_ready()).await {
            Ok(()) => {
                self.delayed.fetch_add(1, Ordering::Relaxed);
                RateDecision::Delayed
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                RateDecision::Dropped
            }
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            granted: self.granted.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_drop() {
        let limiter = OrderRateLimiter::new(10, Duration::ZERO);

        for _ in 0..15 {
            limiter.acquire().await;
        }

        let stats = limiter.stats();
        assert_eq!(stats.granted, 10);
        assert_eq!(stats.dropped, 5);
    }

    #[tokio::test]
    async fn test_burst_then_delay() {
        let limiter = OrderRateLimiter::new(10, Duration::from_secs(1));

        for _ in 0..15 {
            assert!(limiter.acquire().await.is_permitted());
        }

        let stats = limiter.stats();
        assert_eq!(stats.granted + stats.delayed, 15);
        assert!(stats.delayed >= 5, "only {} delayed", stats.delayed);
    }

    #[tokio::test]
    async fn test_zero_wait_drops_instead_of_blocking() {
        let limiter = OrderRateLimiter::new(1, Duration::ZERO);
        assert_eq!(limiter.acquire().await, RateDecision::Granted);
        assert_eq!(limiter.acquire().await, RateDecision::Dropped);
        assert!(!RateDecision::Dropped.is_permitted());
    }

    #[test]
    fn test_zero_rate_falls_back_to_one() {
        let limiter = OrderRateLimiter::new(0, Duration::ZERO);
        assert_eq!(limiter.per_second(), 1);
    }
}
