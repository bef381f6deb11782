//! Error types for docket-core
//!
//! This module provides the error taxonomy used by the retry and circuit
//! breaker layers and user-friendly formatting for the CLI.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or request
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Analysis name not in the agent table
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// Input rejected before any call was made
    #[error("validation error: {0}")]
    Validation(String),

    /// Circuit breaker rejected the call
    #[error("circuit open for {agent}")]
    CircuitOpen {
        /// Agent or call target
        agent: String,
    },

    /// Per-agent deadline exceeded
    #[error("{agent} timed out after {after_ms}ms")]
    Timeout {
        /// Agent name
        agent: String,
        /// Deadline that was exceeded
        after_ms: u64,
    },

    /// Run cancelled or run deadline reached
    #[error("cancelled")]
    Cancelled,

    /// Document retrieval failed
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Agent-level failure with a free-form message
    #[error("agent error: {0}")]
    Agent(String),

    /// LLM provider error
    #[error("llm error: {0}")]
    Llm(#[from] docket_llm::Error),

    /// Tool error
    #[error("tool error: {0}")]
    Tool(#[from] docket_tools::Error),

    /// Internal error (task join, closed channels)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// How the retry and breaker layers treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, provider 5xx, rate limit: retry with backoff
    Transient,
    /// Attempt exceeded its deadline: retried like a transient failure
    Timeout,
    /// Validation, permission, auth, not-found: never retried
    Fatal,
    /// Rejected by an open breaker without calling out
    CircuitOpen,
    /// Run cancelled
    Cancelled,
}

impl ErrorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Fatal => "fatal",
            Self::CircuitOpen => "circuit_open",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }

    /// Whether the failure counts against the circuit breaker
    #[must_use]
    pub fn counts_as_failure(&self) -> bool {
        self.is_retryable()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Error {
    /// Kind implied by the variant alone.
    ///
    /// `None` means the message has to be inspected (see
    /// `RetryPolicy::classify`).
    #[must_use]
    pub fn typed_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Configuration(_) | Error::UnknownAgent(_) | Error::Validation(_) => {
                Some(ErrorKind::Fatal)
            }
            Error::CircuitOpen { .. } => Some(ErrorKind::CircuitOpen),
            Error::Timeout { .. } => Some(ErrorKind::Timeout),
            Error::Cancelled => Some(ErrorKind::Cancelled),
            Error::Retrieval(_) => Some(ErrorKind::Transient),
            Error::Llm(docket_llm::Error::Timeout(_)) => Some(ErrorKind::Timeout),
            Error::Llm(e) => Some(if e.is_transient() {
                ErrorKind::Transient
            } else {
                ErrorKind::Fatal
            }),
            Error::Tool(e) => Some(if e.is_transient() {
                ErrorKind::Transient
            } else {
                ErrorKind::Fatal
            }),
            Error::Agent(_) | Error::Internal(_) => None,
        }
    }
}

/// Trait for user-friendly error messages
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Configuration(msg) => format!("⚙️ Configuration error: {}", msg),
            Error::UnknownAgent(name) => format!("❓ Unknown analysis type '{}'.", name),
            Error::Validation(msg) => format!("🚫 Invalid input: {}", msg),
            Error::CircuitOpen { agent } => {
                format!("🔌 The {} analysis is temporarily disabled after repeated failures.", agent)
            }
            Error::Timeout { agent, after_ms } => {
                format!("⏱️ The {} analysis did not finish within {}s.", agent, after_ms / 1000)
            }
            Error::Cancelled => "🛑 The run was cancelled.".to_string(),
            Error::Retrieval(msg) => format!("📂 Could not read case documents: {}", msg),
            Error::Agent(msg) => format!("⚡ Analysis failed: {}", msg),
            Error::Llm(e) => format!("🤖 LLM error: {}", e),
            Error::Tool(e) => format!("🔧 Tool error: {}", e),
            Error::Internal(msg) => format!("❌ Internal error: {}", msg),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::UnknownAgent(_) => {
                Some("💡 Run `docket agents` to list the available analyses.".to_string())
            }
            Error::Configuration(_) => Some(
                "💡 Check config/default.toml, config/local.toml or DOCKET_* variables."
                    .to_string(),
            ),
            Error::CircuitOpen { .. } => {
                Some("💡 Wait for the cooldown to pass and run the analysis again.".to_string())
            }
            Error::Llm(docket_llm::Error::NotConfigured(_))
            | Error::Llm(docket_llm::Error::Authentication(_)) => Some(
                "💡 Set YANDEX_FOLDER_ID and YANDEX_API_KEY (or YANDEX_IAM_TOKEN).".to_string(),
            ),
            Error::Retrieval(_) => {
                Some("💡 Check the --docs directory contains a folder per case.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = error.user_message();
    output.push('\n');

    if let Some(suggestion) = error.suggestion() {
        output.push('\n');
        output.push_str(&suggestion);
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests;
