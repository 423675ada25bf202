//! Token-bucket rate limiting for outbound source calls.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token-bucket gate for one source: capacity `limit` refilled evenly over
/// `window`. `acquire` never errors, it only reports how long to wait.
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
}

impl RateGate {
    pub fn new(limit: u32, window: Duration) -> Self {
        let clock = DefaultClock::default();
        let limiter = RateLimiter::direct_with_clock(quota_from_window(window, limit), &clock);
        Self {
            limiter: Arc::new(limiter),
            clock,
        }
    }

    /// Try to consume one token. On a drained bucket, returns the duration
    /// until the next token is available; the caller must not issue the
    /// request before it elapses.
    pub fn acquire(&self) -> Result<(), Duration> {
        match self.limiter.check() {
            Ok(()) => Ok(()),
            Err(not_until) => Err(not_until.wait_time_from(self.clock.now())),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire_ready(&self) {
        loop {
            match self.acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait.max(Duration::from_millis(1))).await,
            }
        }
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let safe_limit = limit.max(1);
    let burst = NonZeroU32::new(safe_limit).expect("safe limit must be non-zero");

    let seconds_per_cell = (window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .expect("period is always greater than zero")
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_up_to_capacity_then_waits() {
        let gate = RateGate::new(3, Duration::from_secs(60));

        assert!(gate.acquire().is_ok());
        assert!(gate.acquire().is_ok());
        assert!(gate.acquire().is_ok());

        let wait = gate.acquire().expect_err("bucket should be drained");
        // One token refills every window/limit = 20s.
        assert!(wait > Duration::from_secs(1));
        assert!(wait <= Duration::from_secs(20));
    }

    #[test]
    fn wait_is_consistent_with_refill_rate() {
        let gate = RateGate::new(10, Duration::from_secs(10));

        for _ in 0..10 {
            assert!(gate.acquire().is_ok());
        }
        let wait = gate.acquire().expect_err("bucket should be drained");
        // Refill rate is 1 token/s.
        assert!(wait <= Duration::from_secs(1) + Duration::from_millis(50));
    }

    #[tokio::test]
    async fn acquire_ready_eventually_grants_a_token() {
        let gate = RateGate::new(2, Duration::from_millis(100));

        gate.acquire_ready().await;
        gate.acquire_ready().await;
        // Third acquisition must wait for a refill but completes.
        gate.acquire_ready().await;
    }
}
