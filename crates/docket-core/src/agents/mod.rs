//! Agents - schedulable analysis tasks
//!
//! Each [`AgentKind`] maps to one handler implementing [`Agent`]. The
//! dependency and priority table lives with the kind so plans can be
//! validated before any agent runs.

pub mod analysis;
pub mod kind;
pub mod registry;

pub use analysis::{AnalysisSettings, LlmAnalysisAgent};
pub use kind::{parse_analyses, AgentKind, AgentSpec};
pub use registry::AgentRegistry;

use crate::error::Result;
use docket_llm::CostTracker;
use docket_tools::{Sensitivity, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Result stored for one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Raw model text
    pub content: String,
    /// Parsed JSON, when the model returned one
    pub structured: Option<serde_json::Value>,
    /// Prompt + completion tokens
    pub tokens: u32,
    /// Model that produced the result
    pub model: String,
    /// Wall time of the successful attempt
    pub duration_ms: u64,
    /// Attempts used, including the successful one
    pub attempts: u32,
}

impl AgentOutput {
    /// Output with only text content
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Attach a structured payload
    #[must_use]
    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured = Some(value);
        self
    }
}

/// Everything an agent may use during one attempt
#[derive(Clone)]
pub struct AgentContext {
    /// Run identifier
    pub run_id: Uuid,
    /// Case under analysis
    pub case_id: String,
    /// Agent being run
    pub kind: AgentKind,
    /// 1-based attempt number
    pub attempt: u32,
    /// Results of the agent's dependencies
    pub dependencies: BTreeMap<AgentKind, AgentOutput>,
    /// Tool catalogue
    pub tools: Arc<ToolRegistry>,
    /// Highest tool sensitivity this run may use
    pub max_tool_sensitivity: Sensitivity,
    /// Cost accounting
    pub costs: Arc<CostTracker>,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("run_id", &self.run_id)
            .field("case_id", &self.case_id)
            .field("kind", &self.kind)
            .field("attempt", &self.attempt)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AgentContext {
    /// Tool context for calls made on behalf of this agent
    #[must_use]
    pub fn tool_context(&self) -> docket_tools::ToolContext {
        docket_tools::ToolContext::new(
            self.case_id.clone(),
            self.run_id.to_string(),
            self.kind.as_str(),
        )
    }
}

/// A schedulable analysis task
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Which analysis this handler produces
    fn kind(&self) -> AgentKind;

    /// Run one attempt
    async fn run(&self, ctx: &AgentContext) -> Result<AgentOutput>;
}
