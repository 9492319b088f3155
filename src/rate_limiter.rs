//! Per-worker token-bucket rate limiter.

use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Token bucket limiting one worker to at most `rps` requests per second.
///
/// Not `Send`-shared: each worker owns its limiter and calls `acquire`
/// sequentially from its own scenario loop.
pub struct RateLimiter {
    rps: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `rps == 0` means unlimited; `acquire` becomes a no-op.
    pub fn new(rps: u32) -> Self {
        let rps = rps as f64;
        Self {
            rps,
            capacity: rps,
            tokens: rps,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        if elapsed <= 0.0 {
            return;
        }

        self.tokens = (self.tokens + elapsed * self.rps).min(self.capacity);
    }

    /// Blocks (asynchronously) until a token is available, then consumes it.
    pub async fn acquire(&mut self) {
        if self.rps <= 0.0 {
            return;
        }

        loop {
            self.refill();

            if self.tokens >= 1.0 {
                self.tokens -= 1.0;
                return;
            }

            let deficit = 1.0 - self.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rps);
            sleep(wait).await;
        }
    }
}
