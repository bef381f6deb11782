//! LLM call throttling
//!
//! A token bucket bounds calls per second to the provider and a semaphore
//! bounds how many calls are in flight. Both are shared by every run in the
//! process since they protect one downstream quota.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Throttle configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained calls per second
    pub requests_per_second: f64,
    /// Burst capacity
    pub bucket_size: u32,
    /// Maximum calls in flight
    pub max_concurrent: usize,
}

/// Slowest sustained rate a bucket accepts
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            bucket_size: 10,
            max_concurrent: 4,
        }
    }
}

impl RateLimitConfig {
    /// Create a new config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set sustained rate, at least `MIN_REQUESTS_PER_SECOND`
    #[must_use]
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps.max(MIN_REQUESTS_PER_SECOND);
        self
    }

    /// Set burst capacity
    #[must_use]
    pub fn with_bucket_size(mut self, size: u32) -> Self {
        self.bucket_size = size.max(1);
        self
    }

    /// Set concurrency bound
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Create a full bucket
    #[must_use]
    pub fn new(capacity: u32, requests_per_second: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            rate: requests_per_second.max(MIN_REQUESTS_PER_SECOND),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Take a token if one is available
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket, Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for token");
            sleep(wait).await;
        }
    }

    /// Tokens currently available
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }
}

/// Permit for one in-flight call; released on drop
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

/// Token bucket plus concurrency semaphore
#[derive(Debug)]
pub struct Throttle {
    config: RateLimitConfig,
    bucket: TokenBucket,
    semaphore: Arc<Semaphore>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl Throttle {
    /// Create a new throttle
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config.bucket_size, config.requests_per_second),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
        }
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait for a rate token, then for a concurrency slot
    pub async fn acquire(&self) -> Result<ThrottlePermit> {
        self.bucket.acquire().await;
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("throttle semaphore closed".to_string()))?;
        Ok(ThrottlePermit { _permit: permit })
    }

    /// Free concurrency slots
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Underlying token bucket
    #[must_use]
    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}
