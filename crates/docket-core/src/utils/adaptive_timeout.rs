//! Adaptive timeouts from observed latency
//!
//! Keeps the last `window` latencies per call target. Once `min_samples`
//! are available the timeout becomes `k * p99 + margin`; before that the
//! caller's static default applies.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

/// Estimator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveTimeoutConfig {
    /// Samples kept per target
    pub window: usize,
    /// Samples needed before the estimate is used
    pub min_samples: usize,
    /// Multiplier applied to p99
    pub k: f64,
    /// Added after scaling
    pub margin: Duration,
}

/// Largest latency multiplier accepted
pub const MAX_K: f64 = 100.0;

impl Default for AdaptiveTimeoutConfig {
    fn default() -> Self {
        Self {
            window: 100,
            min_samples: 5,
            k: 2.0,
            margin: Duration::from_secs(5),
        }
    }
}

impl AdaptiveTimeoutConfig {
    /// Create a new config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set window size
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Set minimum samples
    #[must_use]
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    /// Set multiplier, clamped to `0.0..=MAX_K`
    #[must_use]
    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k.max(0.0).min(MAX_K);
        self
    }

    /// Set margin
    #[must_use]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }
}

/// Per-target latency history
#[derive(Debug, Default)]
pub struct AdaptiveTimeouts {
    config: AdaptiveTimeoutConfig,
    samples: DashMap<String, VecDeque<Duration>>,
}

impl AdaptiveTimeouts {
    /// Create an empty estimator
    #[must_use]
    pub fn new(config: AdaptiveTimeoutConfig) -> Self {
        Self {
            config,
            samples: DashMap::new(),
        }
    }

    /// Record one observed latency
    pub fn record(&self, target: &str, latency: Duration) {
        let mut entry = self.samples.entry(target.to_string()).or_default();
        entry.push_back(latency);
        while entry.len() > self.config.window {
            entry.pop_front();
        }
    }

    /// Number of samples held for `target`
    #[must_use]
    pub fn sample_count(&self, target: &str) -> usize {
        self.samples.get(target).map(|s| s.len()).unwrap_or(0)
    }

    /// 99th percentile latency, nearest-rank
    #[must_use]
    pub fn p99(&self, target: &str) -> Option<Duration> {
        let samples = self.samples.get(target)?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64) * 0.99).ceil() as usize;
        sorted.get(rank.saturating_sub(1)).copied()
    }

    /// Timeout for `target`, or `default` while history is too short
    #[must_use]
    pub fn timeout_for(&self, target: &str, default: Duration) -> Duration {
        if self.sample_count(target) < self.config.min_samples {
            return default;
        }
        match self.p99(target) {
            Some(p99) => Duration::try_from_secs_f64(p99.as_secs_f64() * self.config.k)
                .map_or(default, |scaled| scaled.saturating_add(self.config.margin)),
            None => default,
        }
    }
}
