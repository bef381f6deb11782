//! Error types for docket-llm

use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error returned by the provider
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Sanitized message
        message: String,
    },

    /// Rate limit exceeded on the provider side
    #[error("rate limit exceeded")]
    RateLimit,

    /// Credentials rejected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Model or folder does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),
}

impl Error {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status >= 500 || *status == 408,
            Self::RateLimit | Self::Network(_) | Self::Timeout(_) => true,
            Self::NotConfigured(_)
            | Self::Authentication(_)
            | Self::NotFound(_)
            | Self::InvalidResponse(_) => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
