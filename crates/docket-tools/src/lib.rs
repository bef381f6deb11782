//! Docket Tools - Tool Registry
//!
//! This crate governs which callable capabilities each analysis agent may use:
//! - Registry: registration, sensitivity tiers, allow/deny lookup, accounting
//! - Rate limit: per-tool sliding-window call limits

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod rate_limit;
pub mod registry;

pub use error::{Error, Result};
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use registry::{
    Sensitivity, Tool, ToolContext, ToolDefinition, ToolRegistry, ToolResult, ToolStats, ToolUsage,
};
