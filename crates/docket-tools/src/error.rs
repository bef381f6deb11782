//! Error types for docket-tools

use thiserror::Error;

/// Tool error type
#[derive(Debug, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Agent may not call this tool
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Tool execution failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Per-tool call limit reached
    #[error("rate limit exceeded for tool {tool}, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Tool name
        tool: String,
        /// Time until a slot frees up
        retry_after_ms: u64,
    },

    /// Tool is registered but disabled
    #[error("tool disabled: {0}")]
    Disabled(String),
}

impl Error {
    /// Whether the same call may succeed later
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Execution(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
