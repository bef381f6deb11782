//! Docket LLM - LLM Provider Abstraction
//!
//! This crate provides the language-model seam used by the analysis agents:
//! - Provider: the `LlmProvider` trait and request/response types
//! - Yandex: Yandex Foundation Models (YandexGPT) over HTTP
//! - Cost: per-agent token and cost accounting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost;
pub mod error;
pub mod provider;
pub mod yandex;

pub use cost::{
    global_tracker, AgentCost, CostSummary, CostTracker, ModelPricing, UsageRecord, UsageSource,
};
pub use error::{Error, Result};
pub use provider::{
    CompletionRequest, CompletionResponse, LlmProvider, Message, MessageRole, ResponseFormat,
    TokenUsage,
};
pub use yandex::{YandexAuth, YandexConfig, YandexProvider};
