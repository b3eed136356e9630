//! Process-wide admission control.
//!
//! One token bucket guards the ingestion entry point. Every inbound request
//! costs exactly one token regardless of how many events it carries. Refill
//! is computed lazily from the wall-clock time elapsed since the previous
//! call, so there is no background ticker.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::limits::{DEFAULT_BUCKET_CAPACITY, DEFAULT_REFILL_PER_SEC};

/// Token bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size, requests)
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Tokens added per second
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

fn default_capacity() -> u32 {
    DEFAULT_BUCKET_CAPACITY
}

fn default_refill_per_sec() -> f64 {
    DEFAULT_REFILL_PER_SEC
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            last_update: now,
        }
    }

    fn refill(&mut self, now: Instant, rate: f64, capacity: u32) {
        // A caller holding an older Instant must not move the clock backwards.
        if now <= self.last_update {
            return;
        }
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        if rate > 0.0 {
            self.tokens = (self.tokens + elapsed * rate).min(capacity as f64);
        }
    }

    fn try_acquire(&mut self, now: Instant, rate: f64, capacity: u32) -> bool {
        self.refill(now, rate, capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Global token bucket rate limiter.
///
/// Refill, check and deduction happen under one lock, so concurrent callers
/// can never overdraw the bucket.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a limiter with a full bucket whose clock starts at `now`.
    pub fn starting_at(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::full(config.capacity, now)),
            config,
        }
    }

    /// Admits one request, consuming one token.
    ///
    /// Returns false without touching the token count when fewer than one
    /// token is available.
    pub fn admit(&self) -> bool {
        self.admit_at(Instant::now())
    }

    /// [`admit`](Self::admit) against an explicit clock reading.
    pub fn admit_at(&self, now: Instant) -> bool {
        self.bucket
            .lock()
            .try_acquire(now, self.config.refill_per_sec, self.config.capacity)
    }

    /// Whole seconds until the next token becomes available.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_secs_at(Instant::now())
    }

    pub fn retry_after_secs_at(&self, now: Instant) -> u64 {
        let mut bucket = self.bucket.lock();
        bucket.refill(now, self.config.refill_per_sec, self.config.capacity);

        let missing = 1.0 - bucket.tokens;
        if missing <= 0.0 {
            0
        } else if self.config.refill_per_sec <= 0.0 {
            u64::MAX
        } else {
            (missing / self.config.refill_per_sec).ceil() as u64
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
