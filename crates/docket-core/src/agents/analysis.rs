//! LLM-backed analysis agent
//!
//! One generic agent per [`AgentKind`]: it gathers context through the
//! tools the agent is permitted to call, adds its dependencies' results
//! and asks the model for a JSON answer.

use super::{Agent, AgentContext, AgentKind, AgentOutput};
use crate::error::{Error, Result};
use docket_llm::{CompletionRequest, LlmProvider, Message, TokenUsage};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Tool used for document context
pub const SEARCH_TOOL: &str = "search_documents";
/// Tool used by the privilege screen
pub const PRIVILEGE_TOOL: &str = "privilege_log_lookup";

/// Dependency results are clipped to keep prompts bounded
const MAX_DEPENDENCY_CHARS: usize = 4_000;

/// Model parameters shared by analysis agents
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    /// Model name; empty means the provider default
    pub model: String,
    /// Completion token limit
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Chunks requested from the document search
    pub context_chunks: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 2000,
            temperature: 0.2,
            context_chunks: 6,
        }
    }
}

fn instructions(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Classification => {
            "Classify the case documents. Return {\"document_types\": [...], \"practice_area\": str, \"jurisdiction\": str|null}."
        }
        AgentKind::PrivilegeCheck => {
            "Identify material that may be protected by attorney-client privilege or work product. Return {\"privileged\": [{\"document\": str, \"basis\": str}], \"clear\": [str]}."
        }
        AgentKind::EntityExtraction => {
            "Extract people, organisations, places and case numbers. Return {\"entities\": [{\"name\": str, \"type\": str, \"mentions\": int}]}."
        }
        AgentKind::DeepAnalysis => {
            "Analyse the legal issues raised by the documents. Return {\"issues\": [{\"issue\": str, \"analysis\": str, \"authorities\": [str]}]}."
        }
        AgentKind::Timeline => {
            "Build a chronology of events with dates. Return {\"events\": [{\"date\": str, \"event\": str, \"source\": str}]}."
        }
        AgentKind::KeyFacts => {
            "List the material facts of the case. Return {\"facts\": [{\"fact\": str, \"source\": str, \"importance\": \"high\"|\"medium\"|\"low\"}]}."
        }
        AgentKind::Discrepancy => {
            "Find contradictions between documents or statements. Return {\"discrepancies\": [{\"description\": str, \"sources\": [str], \"severity\": str}]}."
        }
        AgentKind::Relationship => {
            "Describe relationships between the extracted entities. Return {\"relationships\": [{\"from\": str, \"to\": str, \"relation\": str}]}."
        }
        AgentKind::Risk => {
            "Assess legal risks, using the discrepancies found. Return {\"risks\": [{\"risk\": str, \"likelihood\": str, \"impact\": str, \"mitigation\": str}]}."
        }
        AgentKind::Summary => {
            "Write a concise case summary built on the key facts. Return {\"summary\": str, \"open_questions\": [str]}."
        }
    }
}

fn search_query(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Classification => "agreement contract claim complaint motion order",
        AgentKind::PrivilegeCheck => "privileged confidential attorney counsel advice",
        AgentKind::EntityExtraction | AgentKind::Relationship => {
            "party plaintiff defendant company director between"
        }
        AgentKind::DeepAnalysis => "breach liability obligation clause law court",
        AgentKind::Timeline => "date dated on signed filed served",
        AgentKind::KeyFacts | AgentKind::Summary => "fact agreed paid delivered failed",
        AgentKind::Discrepancy | AgentKind::Risk => "stated however contrary claims denies",
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Generic LLM analysis agent
pub struct LlmAnalysisAgent {
    kind: AgentKind,
    provider: Arc<dyn LlmProvider>,
    settings: AnalysisSettings,
}

impl LlmAnalysisAgent {
    /// Create an agent for `kind`
    #[must_use]
    pub fn new(kind: AgentKind, provider: Arc<dyn LlmProvider>, settings: AnalysisSettings) -> Self {
        Self {
            kind,
            provider,
            settings,
        }
    }

    /// Invoke a tool if this agent may use it, recording its cost
    async fn call_tool(
        &self,
        ctx: &AgentContext,
        tool: &str,
        input: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        let permitted = ctx
            .tools
            .get_tools_for_agent(self.kind.as_str(), ctx.max_tool_sensitivity, &[])
            .iter()
            .any(|d| d.name == tool);
        if !permitted {
            return Ok(None);
        }

        let outcome = ctx.tools.invoke(tool, &ctx.tool_context(), input).await;
        let run_id = ctx.run_id.to_string();
        let cost = outcome.as_ref().map_or(0.0, |r| r.cost);
        ctx.costs
            .record_tool_usage(
                Some(&run_id),
                self.kind.as_str(),
                tool,
                cost,
                matches!(&outcome, Ok(r) if r.success),
            )
            .await;

        let result = outcome?;
        if !result.success {
            return Err(Error::Retrieval(
                result.error.unwrap_or_else(|| format!("{tool} failed")),
            ));
        }
        Ok(Some(result.output))
    }

    async fn gather_context(&self, ctx: &AgentContext) -> Result<String> {
        let mut context = String::new();

        let search = self
            .call_tool(
                ctx,
                SEARCH_TOOL,
                serde_json::json!({
                    "query": search_query(self.kind),
                    "k": self.settings.context_chunks,
                }),
            )
            .await?;
        if let Some(output) = search {
            for chunk in output["chunks"].as_array().into_iter().flatten() {
                let _ = writeln!(
                    context,
                    "[{}#{}] {}\n",
                    chunk["document"].as_str().unwrap_or("?"),
                    chunk["index"].as_u64().unwrap_or(0),
                    chunk["text"].as_str().unwrap_or_default()
                );
            }
        }

        if self.kind == AgentKind::PrivilegeCheck {
            if let Some(output) = self
                .call_tool(ctx, PRIVILEGE_TOOL, serde_json::json!({}))
                .await?
            {
                let _ = writeln!(context, "Privilege log:\n{}\n", output["entries"]);
            }
        }

        Ok(context)
    }

    fn build_messages(&self, ctx: &AgentContext, documents: &str) -> Vec<Message> {
        let system = format!(
            "You are a litigation support analyst performing the {} analysis for case {}. {} Respond with a single JSON object and nothing else.",
            self.kind, ctx.case_id, instructions(self.kind)
        );

        let mut user = String::new();
        if documents.is_empty() {
            user.push_str("No case documents were found.\n");
        } else {
            let _ = writeln!(user, "Case documents:\n{documents}");
        }
        for (dependency, output) in &ctx.dependencies {
            let body = output
                .structured
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| output.content.clone());
            let _ = writeln!(
                user,
                "Result of the {} analysis:\n{}\n",
                dependency,
                truncate(&body, MAX_DEPENDENCY_CHARS)
            );
        }

        vec![Message::system(system), Message::user(user)]
    }
}

#[async_trait::async_trait]
impl Agent for LlmAnalysisAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    #[instrument(skip(self, ctx), fields(agent = %self.kind, case_id = %ctx.case_id, attempt = ctx.attempt))]
    async fn run(&self, ctx: &AgentContext) -> Result<AgentOutput> {
        let start = Instant::now();
        let documents = self.gather_context(ctx).await?;

        let request = CompletionRequest::new(self.settings.model.clone())
            .with_messages(self.build_messages(ctx, &documents))
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature)
            .json_output();

        let run_id = ctx.run_id.to_string();
        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                let model = if self.settings.model.is_empty() {
                    self.provider.default_model().to_string()
                } else {
                    self.settings.model.clone()
                };
                ctx.costs
                    .record_llm_usage(
                        Some(&run_id),
                        self.kind.as_str(),
                        &model,
                        TokenUsage::default(),
                        start.elapsed().as_millis() as u64,
                        false,
                    )
                    .await;
                return Err(e.into());
            }
        };

        let usage = response.usage.unwrap_or_default();
        let elapsed = start.elapsed().as_millis() as u64;
        ctx.costs
            .record_llm_usage(
                Some(&run_id),
                self.kind.as_str(),
                &response.model,
                usage,
                elapsed,
                true,
            )
            .await;
        debug!(tokens = usage.total_tokens, elapsed_ms = elapsed, "Analysis completed");

        Ok(AgentOutput {
            content: response.content,
            structured: response.structured,
            tokens: usage.total_tokens,
            model: response.model,
            duration_ms: elapsed,
            attempts: ctx.attempt,
        })
    }
}
