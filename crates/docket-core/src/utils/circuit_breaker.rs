//! Circuit Breaker pattern implementation
//!
//! One breaker per agent (or external call target). The breaker has three
//! states:
//! - Closed: calls pass through; outcomes are kept in a sliding window and
//!   the breaker opens once the windowed failure rate reaches the threshold
//! - Open: calls are rejected without being attempted until the cooldown
//!   has elapsed; the move to half-open happens on the next check
//! - HalfOpen: a fixed number of probe calls pass; any failure reopens,
//!   enough consecutive successes close and clear the history. A probe that
//!   ends without a verdict hands its slot back with `release_probe`

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failure rate exceeded threshold - requests are rejected
    Open,
    /// Testing recovery - limited probes pass through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure rate (0.0 - 1.0) at which the breaker opens
    pub failure_rate_threshold: f64,
    /// Calls needed in the window before the rate is evaluated
    pub minimum_calls: u32,
    /// Sliding window for outcomes
    pub window: Duration,
    /// Time spent open before probing
    pub cooldown: Duration,
    /// Probe calls allowed while half-open
    pub half_open_max_calls: u32,
    /// Consecutive half-open successes that close the breaker
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_calls: 3,
            window: Duration::from_secs(300),
            cooldown: Duration::from_secs(60),
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure rate threshold
    #[must_use]
    pub fn with_failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set minimum calls before evaluating the rate
    #[must_use]
    pub fn with_minimum_calls(mut self, calls: u32) -> Self {
        self.minimum_calls = calls.max(1);
        self
    }

    /// Set the sliding window
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set cooldown
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set half-open probe count
    #[must_use]
    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls.max(1);
        self
    }

    /// Set success threshold for half-open state
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }
}

/// Snapshot for operational visibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Breaker name (agent or call target)
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Failures / calls within the window
    pub error_rate: f64,
    /// Failures within the window
    pub error_count: u32,
    /// Successes within the window
    pub success_count: u32,
    /// Milliseconds since the last failure
    pub last_failure_ms_ago: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// (when, succeeded)
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    half_open_at: Option<Instant>,
    last_failure_at: Option<Instant>,
    probes_issued: u32,
    probe_successes: u32,
}

/// Circuit breaker for fault tolerance
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                opened_at: None,
                half_open_at: None,
                last_failure_at: None,
                probes_issued: 0,
                probe_successes: 0,
            }),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state without applying the cooldown transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether calls are currently rejected. Applies the open to half-open
    /// transition when the cooldown has elapsed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let mut inner = self.lock();
        self.check_cooldown(&mut inner, Instant::now());
        inner.state == CircuitState::Open
    }

    /// Ask permission for one call. In half-open this consumes a probe slot,
    /// which the caller settles with `record_success`, `record_failure` or
    /// `release_probe`.
    #[must_use]
    pub fn allow_request(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        self.check_cooldown(&mut inner, now);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probes_issued >= self.config.half_open_max_calls
                    && self.probes_stale(&inner, now)
                {
                    warn!(
                        name = %self.name,
                        probes = inner.probes_issued,
                        "Half-open probes never settled, starting a new probe round"
                    );
                    Self::enter_half_open(&mut inner, now);
                }
                if inner.probes_issued < self.config.half_open_max_calls {
                    inner.probes_issued += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Hand back a half-open probe slot whose call ended without a verdict
    /// (fatal error, cancellation). No-op in other states.
    pub fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.probes_issued > inner.probe_successes {
            inner.probes_issued -= 1;
            debug!(
                name = %self.name,
                probes = inner.probes_issued,
                "Half-open probe released without outcome"
            );
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.outcomes.push_back((now, true));
                self.prune(&mut inner, now);
            }
            CircuitState::HalfOpen => {
                inner.probe_successes += 1;
                debug!(
                    name = %self.name,
                    successes = inner.probe_successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success in half-open state"
                );
                if inner.probe_successes >= self.config.success_threshold {
                    self.close(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.outcomes.push_back((now, false));
                self.prune(&mut inner, now);

                let (failures, total) = Self::counts(&inner);
                let rate = failures as f64 / total as f64;
                debug!(
                    name = %self.name,
                    failures,
                    total,
                    rate,
                    "Circuit breaker failure recorded"
                );

                if total >= self.config.minimum_calls && rate >= self.config.failure_rate_threshold
                {
                    self.open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Circuit breaker failure in half-open state, reopening");
                self.open(&mut inner, now);
            }
            CircuitState::Open => {}
        }
    }

    /// Snapshot of the breaker
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let now = Instant::now();
        let mut inner = self.lock();
        self.check_cooldown(&mut inner, now);
        self.prune(&mut inner, now);

        let (failures, total) = Self::counts(&inner);
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            error_rate: if total == 0 {
                0.0
            } else {
                failures as f64 / total as f64
            },
            error_count: failures,
            success_count: total - failures,
            last_failure_ms_ago: inner
                .last_failure_at
                .map(|t| now.duration_since(t).as_millis() as u64),
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.close(&mut inner);
    }

    fn counts(inner: &Inner) -> (u32, u32) {
        let total = inner.outcomes.len() as u32;
        let failures = inner.outcomes.iter().filter(|(_, ok)| !ok).count() as u32;
        (failures, total)
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some((at, _)) = inner.outcomes.front() {
            if now.duration_since(*at) > self.config.window {
                inner.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn check_cooldown(&self, inner: &mut Inner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner
            .opened_at
            .is_none_or(|opened| now.duration_since(opened) >= self.config.cooldown);
        if cooled {
            info!(name = %self.name, "Circuit breaker entering half-open state");
            Self::enter_half_open(inner, now);
        }
    }

    fn enter_half_open(inner: &mut Inner, now: Instant) {
        inner.state = CircuitState::HalfOpen;
        inner.half_open_at = Some(now);
        inner.probes_issued = 0;
        inner.probe_successes = 0;
    }

    /// Probes out for a whole cooldown without settling are presumed lost
    fn probes_stale(&self, inner: &Inner, now: Instant) -> bool {
        inner
            .half_open_at
            .is_none_or(|since| now.duration_since(since) >= self.config.cooldown)
    }

    fn open(&self, inner: &mut Inner, now: Instant) {
        info!(
            name = %self.name,
            previous = %inner.state,
            "Circuit breaker opened"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.half_open_at = None;
        inner.probes_issued = 0;
        inner.probe_successes = 0;
    }

    fn close(&self, inner: &mut Inner) {
        if inner.state != CircuitState::Closed {
            info!(name = %self.name, "Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.outcomes.clear();
        inner.opened_at = None;
        inner.half_open_at = None;
        inner.probes_issued = 0;
        inner.probe_successes = 0;
    }
}

/// Process-wide breakers keyed by agent or call-target name.
///
/// Breakers are created lazily on first use and never removed.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers share `config`
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `name`, created on first use
    #[must_use]
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())));
        Arc::clone(breaker.value())
    }

    /// Existing breaker for `name`
    #[must_use]
    pub fn peek(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| Arc::clone(b.value()))
    }

    /// Whether `name` currently rejects calls. Unknown names are closed.
    #[must_use]
    pub fn is_open(&self, name: &str) -> bool {
        self.peek(name).is_some_and(|b| b.is_open())
    }

    /// Stats for one breaker, or every breaker sorted by name
    #[must_use]
    pub fn stats(&self, name: Option<&str>) -> Vec<CircuitBreakerStats> {
        match name {
            Some(name) => self.peek(name).map(|b| b.stats()).into_iter().collect(),
            None => {
                let mut all: Vec<_> = self.breakers.iter().map(|b| b.value().stats()).collect();
                all.sort_by(|a, b| a.name.cmp(&b.name));
                all
            }
        }
    }

    /// Reset one breaker; returns false when it does not exist
    pub fn reset(&self, name: &str) -> bool {
        match self.peek(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests;
