//! Retry logic with exponential backoff
//!
//! `delay(attempt) = min(max_delay, base_delay * exponential_base^attempt) * (1 ± jitter)`.
//! Retries stop when attempts are exhausted, when the error is fatal, or
//! when the circuit breaker for the call target is open.

use crate::error::{Error, ErrorKind};
use crate::utils::circuit_breaker::CircuitBreaker;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const DEFAULT_FATAL_PATTERNS: &[&str] = &[
    "validation",
    "permission",
    "authentication",
    "unauthorized",
    "forbidden",
    "not found",
];

const DEFAULT_RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "rate limit",
    "503",
    "502",
    "500",
    "unavailable",
];

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for the un-jittered delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub exponential_base: f64,
    /// Relative jitter (0.1 means ±10%)
    pub jitter_fraction: f64,
    /// Message substrings that make an error fatal
    pub fatal_patterns: Vec<String>,
    /// Message substrings that make an error retryable
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter_fraction: 0.1,
            fatal_patterns: DEFAULT_FATAL_PATTERNS.iter().map(|s| s.to_string()).collect(),
            retryable_patterns: DEFAULT_RETRYABLE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set base delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set exponential base
    #[must_use]
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base.max(1.0);
        self
    }

    /// Set jitter fraction
    #[must_use]
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Add a fatal message pattern
    #[must_use]
    pub fn with_fatal_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.fatal_patterns.push(pattern.into().to_lowercase());
        self
    }

    /// Delay before retry number `attempt` (0-based) without jitter
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * exp;
        Duration::try_from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
            .unwrap_or(self.max_delay)
    }

    /// Delay before retry number `attempt` (0-based) with jitter applied
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let factor = if self.jitter_fraction > 0.0 {
            1.0 + rand::thread_rng().gen_range(-self.jitter_fraction..=self.jitter_fraction)
        } else {
            1.0
        };
        Duration::try_from_secs_f64((nominal * factor).max(0.0)).unwrap_or(self.max_delay)
    }

    /// Classify an error.
    ///
    /// Typed variants decide directly; free-form messages are matched
    /// case-insensitively, fatal patterns first. Unknown messages are
    /// treated as transient.
    #[must_use]
    pub fn classify(&self, error: &Error) -> ErrorKind {
        error
            .typed_kind()
            .unwrap_or_else(|| self.classify_message(&error.to_string()))
    }

    /// Classify a bare message
    #[must_use]
    pub fn classify_message(&self, message: &str) -> ErrorKind {
        let lower = message.to_lowercase();
        if self.fatal_patterns.iter().any(|p| lower.contains(p.as_str())) {
            return ErrorKind::Fatal;
        }
        if self
            .retryable_patterns
            .iter()
            .any(|p| lower.contains(p.as_str()))
        {
            return if lower.contains("timeout") || lower.contains("timed out") {
                ErrorKind::Timeout
            } else {
                ErrorKind::Transient
            };
        }
        ErrorKind::Transient
    }
}

/// One failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// 1-based attempt number
    pub attempt: u32,
    /// Classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result
    pub result: Result<T, Error>,
    /// Attempts actually made (calls rejected by the breaker are not attempts)
    pub attempts: u32,
    /// Every failed attempt, in order
    pub failures: Vec<AttemptFailure>,
}

impl<T> RetryOutcome<T> {
    /// Kind of the final failure, if any
    #[must_use]
    pub fn final_kind(&self) -> Option<ErrorKind> {
        self.failures.last().map(|f| f.kind)
    }
}

/// Admission taken from a breaker for one attempt. Dropping it unsettled
/// hands a half-open probe slot back.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_probe();
        }
    }
}

/// Execute `operation` with retries, consulting `breaker` before each call.
///
/// `operation` receives the 1-based attempt number. Transient and timeout
/// failures are recorded on the breaker; fatal failures and breaker
/// rejections are not. An attempt that ends without a verdict (fatal error,
/// or the future dropped on cancellation) releases its half-open probe.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut failures = Vec::new();
    let mut attempts = 0;

    loop {
        if !breaker.allow_request() {
            debug!(target_name = %breaker.name(), attempts, "Circuit open, not attempting call");
            let error = Error::CircuitOpen {
                agent: breaker.name().to_string(),
            };
            failures.push(AttemptFailure {
                attempt: attempts + 1,
                kind: ErrorKind::CircuitOpen,
                message: error.to_string(),
            });
            return RetryOutcome {
                result: Err(error),
                attempts,
                failures,
            };
        }

        let admission = Admission::new(breaker);
        attempts += 1;
        match operation(attempts).await {
            Ok(value) => {
                admission.success();
                if attempts > 1 {
                    debug!(target_name = %breaker.name(), attempts, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    failures,
                };
            }
            Err(error) => {
                let kind = policy.classify(&error);
                if kind.counts_as_failure() {
                    admission.failure();
                } else {
                    drop(admission);
                }
                failures.push(AttemptFailure {
                    attempt: attempts,
                    kind,
                    message: error.to_string(),
                });

                let retries_used = attempts - 1;
                if !kind.is_retryable() || retries_used >= policy.max_retries {
                    debug!(
                        target_name = %breaker.name(),
                        attempts,
                        kind = %kind,
                        error = %error,
                        "Operation failed, no more retries"
                    );
                    return RetryOutcome {
                        result: Err(error),
                        attempts,
                        failures,
                    };
                }

                let delay = policy.delay(retries_used);
                warn!(
                    target_name = %breaker.name(),
                    attempt = attempts,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    kind = %kind,
                    error = %error,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
