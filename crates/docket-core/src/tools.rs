//! Built-in analysis tools
//!
//! Both tools sit on top of a [`Retriever`] and are registered in the
//! shared [`ToolRegistry`], so every document lookup an agent makes goes
//! through access control and cost accounting.

use crate::agents::AgentKind;
use crate::retrieval::Retriever;
use docket_tools::{Error, Result, Sensitivity, Tool, ToolContext, ToolDefinition, ToolRegistry, ToolResult};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;


/// Upper bound on chunks a single search may return
const MAX_SEARCH_RESULTS: u64 = 20;

/// Phrases that mark a chunk as possibly privileged
const PRIVILEGE_MARKERS: &[&str] = &[
    "attorney-client",
    "privileged",
    "work product",
    "legal advice",
    "confidential",
    "counsel advised",
];

/// Full-text search over the case folder
pub struct SearchDocumentsTool {
    definition: ToolDefinition,
    retriever: Arc<dyn Retriever>,
}

impl SearchDocumentsTool {
    /// Create the tool
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        let definition = ToolDefinition::new(
            "search_documents",
            "Search the case documents and return the most relevant passages",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search terms"},
                "k": {"type": "integer", "minimum": 1, "maximum": MAX_SEARCH_RESULTS}
            },
            "required": ["query"]
        }))
        .with_sensitivity(Sensitivity::Low)
        .with_tag("retrieval")
        .with_cost_estimate(0.0005);

        Self {
            definition,
            retriever,
        }
    }
}

#[async_trait::async_trait]
impl Tool for SearchDocumentsTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        match input.get("query").and_then(|q| q.as_str()) {
            Some(q) if !q.trim().is_empty() => Ok(()),
            _ => Err(Error::InvalidInput("query must be a non-empty string".to_string())),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let query = input["query"].as_str().unwrap_or_default();
        let k = input["k"]
            .as_u64()
            .unwrap_or(5)
            .clamp(1, MAX_SEARCH_RESULTS) as usize;

        let chunks = self
            .retriever
            .retrieve(&ctx.case_id, query, k)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;

        Ok(ToolResult::success(
            json!({ "count": chunks.len(), "chunks": chunks }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Privilege log built from passages carrying privilege markers
pub struct PrivilegeLogLookupTool {
    definition: ToolDefinition,
    retriever: Arc<dyn Retriever>,
}

impl PrivilegeLogLookupTool {
    /// Create the tool
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        let definition = ToolDefinition::new(
            "privilege_log_lookup",
            "List case passages that carry privilege or confidentiality markers",
        )
        .with_sensitivity(Sensitivity::High)
        .allow_agent(AgentKind::PrivilegeCheck.as_str())
        .with_tag("privilege")
        .with_cost_estimate(0.002);

        Self {
            definition,
            retriever,
        }
    }
}

#[async_trait::async_trait]
impl Tool for PrivilegeLogLookupTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> Result<ToolResult> {
        let start = Instant::now();
        let chunks = self
            .retriever
            .retrieve(
                &ctx.case_id,
                &PRIVILEGE_MARKERS.join(" "),
                MAX_SEARCH_RESULTS as usize,
            )
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;

        let entries: Vec<serde_json::Value> = chunks
            .iter()
            .filter_map(|chunk| {
                let lower = chunk.text.to_lowercase();
                let markers: Vec<&str> = PRIVILEGE_MARKERS
                    .iter()
                    .copied()
                    .filter(|m| lower.contains(m))
                    .collect();
                (!markers.is_empty()).then(|| {
                    json!({
                        "document": chunk.document,
                        "index": chunk.index,
                        "markers": markers,
                    })
                })
            })
            .collect();

        Ok(ToolResult::success(
            json!({ "count": entries.len(), "entries": entries }),
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Register the built-in tools
pub fn register_builtins(registry: &mut ToolRegistry, retriever: Arc<dyn Retriever>) {
    registry.register(Arc::new(SearchDocumentsTool::new(Arc::clone(&retriever))));
    registry.register(Arc::new(PrivilegeLogLookupTool::new(retriever)));
}
