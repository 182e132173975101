//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Relay messages accepted per peer per second (3x the 10 Hz pose stream)
pub const RELAY_RATE_LIMIT: u32 = 30;

/// Per-peer rate limiter state
#[derive(Clone)]
pub struct PeerRateLimiter {
    relay_limiter: Arc<Limiter>,
}

impl PeerRateLimiter {
    pub fn new() -> Self {
        Self {
            relay_limiter: create_limiter(RELAY_RATE_LIMIT),
        }
    }

    /// Check if a relayed message is allowed (returns true if allowed)
    pub fn check_relay(&self) -> bool {
        self.relay_limiter.check().is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_above_quota_is_rejected() {
        let limiter = PeerRateLimiter::new();
        let allowed = (0..RELAY_RATE_LIMIT * 2)
            .filter(|_| limiter.check_relay())
            .count();
        assert!(allowed >= 1);
        assert!(allowed <= RELAY_RATE_LIMIT as usize);
    }
}
