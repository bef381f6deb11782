//! Resilience primitives for docket-core
//!
//! - circuit_breaker: per-target breakers and their registry
//! - rate_limiter: token bucket plus concurrency semaphore
//! - retry: backoff policy, error classification, retry loop
//! - adaptive_timeout: latency-derived per-target timeouts

mod adaptive_timeout;
mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use adaptive_timeout::{AdaptiveTimeoutConfig, AdaptiveTimeouts, MAX_K};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState,
};
pub use rate_limiter::{
    RateLimitConfig, Throttle, ThrottlePermit, TokenBucket, MIN_REQUESTS_PER_SECOND,
};
pub use retry::{retry_with_backoff, AttemptFailure, RetryOutcome, RetryPolicy};
