//! The outer loop's fatal guard (§3/§4.6/§9): a token bucket that encodes
//! "if we run the state loop more than 10 times in under 10s, the machine
//! is broken", not defensive coding.

use std::time::Instant;

const CAPACITY: f64 = 10.0;
const REFILL_PER_SEC: f64 = 1.0;

/// A token-bucket rate limiter: capacity 10, refill 1/s.
pub struct RateLimiter {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            tokens: CAPACITY,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * REFILL_PER_SEC).min(CAPACITY);
        self.last_refill = now;
    }

    /// Consumes one token for this iteration of the outer loop. Returns
    /// `false` if the bucket is exhausted -- the caller must treat that as
    /// fatal.
    pub fn take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_capacity_iterations() {
        let mut limiter = RateLimiter::new();
        for _ in 0..10 {
            assert!(limiter.take());
        }
        assert!(!limiter.take());
    }
}
