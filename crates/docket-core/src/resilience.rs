//! Process-wide resilience state
//!
//! Breakers, the LLM throttle and latency history protect a downstream
//! quota shared by every run, so they live in one bundle initialised once
//! per process and handed to each orchestrator by `Arc`.

use crate::utils::{
    AdaptiveTimeoutConfig, AdaptiveTimeouts, CircuitBreakerConfig, CircuitBreakerRegistry,
    RateLimitConfig, Throttle,
};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Configuration for the shared resilience bundle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResilienceConfig {
    /// Token bucket and semaphore
    pub rate_limit: RateLimitConfig,
    /// Breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
    /// Latency-derived timeouts
    pub adaptive_timeout: AdaptiveTimeoutConfig,
}

/// Breakers, throttle and adaptive timeouts
#[derive(Debug)]
pub struct Resilience {
    /// Per-agent circuit breakers
    pub breakers: CircuitBreakerRegistry,
    /// LLM call throttle
    pub throttle: Throttle,
    /// Per-agent latency history
    pub timeouts: AdaptiveTimeouts,
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(&ResilienceConfig::default())
    }
}

impl Resilience {
    /// Build a fresh bundle
    #[must_use]
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone()),
            throttle: Throttle::new(config.rate_limit.clone()),
            timeouts: AdaptiveTimeouts::new(config.adaptive_timeout.clone()),
        }
    }
}

static GLOBAL: OnceLock<Arc<Resilience>> = OnceLock::new();

/// Initialise the process-wide bundle. The first call wins; later calls
/// return the existing bundle and log that their config was ignored.
pub fn init_global(config: &ResilienceConfig) -> Arc<Resilience> {
    let mut created = false;
    let bundle = GLOBAL.get_or_init(|| {
        created = true;
        Arc::new(Resilience::new(config))
    });
    if created {
        info!(
            rps = config.rate_limit.requests_per_second,
            bucket = config.rate_limit.bucket_size,
            max_concurrent = config.rate_limit.max_concurrent,
            "Initialised shared resilience state"
        );
    } else {
        warn!("Shared resilience state already initialised, ignoring new config");
    }
    Arc::clone(bundle)
}

/// Process-wide bundle, initialised with defaults on first use
#[must_use]
pub fn global() -> Arc<Resilience> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(Resilience::default())))
}
