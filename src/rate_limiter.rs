//! Request rate limiting using a token bucket
//!
//! One [`RateLimiter`] is shared by every job talking to the sports data
//! provider. Each provider call takes one token; tokens refill continuously at
//! the configured rate up to the bucket capacity. Callers that find the bucket
//! empty wait for a refill rather than failing, unless the refill cannot arrive
//! within their wait budget.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

/// Cap on a single sleep so concurrent waiters re-check the bucket promptly
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Simple token bucket
#[derive(Debug)]
struct TokenBucket {
    /// Available tokens
    tokens: f64,
    /// Last refill time
    last_refill: Instant,
    /// Tokens per second
    rate: f64,
    /// Maximum burst size
    capacity: f64,
}

impl TokenBucket {
    fn new(rate: f64, capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: Instant::now(),
            rate,
            capacity: capacity as f64,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    fn try_consume(&mut self) -> std::result::Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            // A bucket that never refills reports an unbounded wait
            Err(Duration::try_from_secs_f64((1.0 - self.tokens) / self.rate)
                .unwrap_or(Duration::MAX))
        }
    }
}

/// Shared provider rate limiter (cloneable - state is Arc-wrapped)
#[derive(Clone, Debug)]
pub struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
    max_wait: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter from configuration; the bucket starts full
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            bucket: Arc::new(Mutex::new(TokenBucket::new(
                config.refill_per_second,
                config.capacity,
            ))),
            max_wait: config.max_wait,
        }
    }

    /// Wait for one token
    ///
    /// Returns immediately when a token is available. Otherwise sleeps until the
    /// bucket refills. Fails with [`Error::RateLimitExceeded`] as soon as the
    /// next token cannot arrive before `max_wait` has elapsed since the call began.
    pub async fn acquire(&self) -> Result<()> {
        let started = Instant::now();

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_consume() {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            let waited = started.elapsed();
            if waited.saturating_add(wait) > self.max_wait {
                tracing::warn!(
                    waited_ms = waited.as_millis() as u64,
                    needed_ms = wait.as_millis() as u64,
                    max_wait_ms = self.max_wait.as_millis() as u64,
                    "rate limit wait budget exhausted"
                );
                return Err(Error::RateLimitExceeded {
                    waited: self.max_wait,
                });
            }

            tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for rate limit token");
            tokio::time::sleep(wait.min(MAX_POLL_INTERVAL)).await;
        }
    }

    /// Tokens currently available (after refill), for monitoring
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        bucket.tokens
    }
}
