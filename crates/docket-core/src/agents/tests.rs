use super::*;
use crate::error::Error;
use docket_llm::{CompletionRequest, CompletionResponse, LlmProvider, TokenUsage};
use docket_tools::{Tool, ToolContext, ToolDefinition, ToolResult};
use std::collections::BTreeSet;
use std::sync::Mutex;

struct RecordingProvider {
    reply: std::result::Result<String, docket_llm::Error>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingProvider {
    fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing(error: docket_llm::Error) -> Self {
        Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn default_model(&self) -> &str {
        "test-model"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> docket_llm::Result<CompletionResponse> {
        let format = request.format;
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Ok(content) => Ok(CompletionResponse {
                content: content.clone(),
                structured: None,
                usage: Some(TokenUsage::new(100, 20)),
                model: "test-model".to_string(),
            }
            .parse_structured(format)),
            Err(docket_llm::Error::Timeout(s)) => Err(docket_llm::Error::Timeout(*s)),
            Err(e) => Err(docket_llm::Error::Network(e.to_string())),
        }
    }
}

struct StaticSearch {
    definition: ToolDefinition,
}

impl StaticSearch {
    fn new() -> Self {
        Self {
            definition: ToolDefinition::new("search_documents", "Fixed search results")
                .with_cost_estimate(0.001),
        }
    }
}

#[async_trait::async_trait]
impl Tool for StaticSearch {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        _input: serde_json::Value,
    ) -> docket_tools::Result<ToolResult> {
        Ok(ToolResult::success(
            serde_json::json!({
                "chunks": [{"document": "lease.txt", "index": 0, "text": "The lease was signed on 1 March 2021."}]
            }),
            1,
        ))
    }
}

fn context(kind: AgentKind, tools: ToolRegistry) -> AgentContext {
    AgentContext {
        run_id: Uuid::new_v4(),
        case_id: "case-7".to_string(),
        kind,
        attempt: 1,
        dependencies: BTreeMap::new(),
        tools: Arc::new(tools),
        max_tool_sensitivity: Sensitivity::High,
        costs: Arc::new(CostTracker::new()),
    }
}

fn search_registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(StaticSearch::new()));
    tools
}

#[test]
fn test_dependency_table() {
    assert_eq!(AgentKind::Risk.dependencies(), &[AgentKind::Discrepancy]);
    assert_eq!(AgentKind::Summary.dependencies(), &[AgentKind::KeyFacts]);
    assert_eq!(
        AgentKind::Relationship.dependencies(),
        &[AgentKind::EntityExtraction]
    );
    let independent = AgentKind::ALL
        .iter()
        .filter(|k| k.dependencies().is_empty())
        .count();
    assert_eq!(independent, 7);
}

#[test]
fn test_priority_order() {
    let mut kinds = AgentKind::ALL.to_vec();
    kinds.sort_by_key(|k| k.schedule_key());
    let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "classification",
            "privilege_check",
            "deep_analysis",
            "entity_extraction",
            "key_facts",
            "timeline",
            "discrepancy",
            "relationship",
            "risk",
            "summary",
        ]
    );
}

#[test]
fn test_default_timeouts() {
    assert_eq!(
        AgentKind::Classification.spec().default_timeout,
        std::time::Duration::from_secs(60)
    );
    assert_eq!(
        AgentKind::Risk.spec().default_timeout,
        std::time::Duration::from_secs(180)
    );
    assert_eq!(
        AgentKind::Timeline.spec().default_timeout,
        std::time::Duration::from_secs(120)
    );
}

#[test]
fn test_dependents() {
    assert_eq!(AgentKind::Discrepancy.dependents(), vec![AgentKind::Risk]);
    assert!(AgentKind::Summary.dependents().is_empty());
}

#[test]
fn test_parse_kind() {
    assert_eq!("key-facts".parse::<AgentKind>().unwrap(), AgentKind::KeyFacts);
    assert_eq!(" Risk ".parse::<AgentKind>().unwrap(), AgentKind::Risk);
    let err = "astrology".parse::<AgentKind>().unwrap_err();
    assert!(matches!(err, Error::UnknownAgent(name) if name == "astrology"));
}

#[test]
fn test_parse_analyses() {
    let kinds = parse_analyses(&["risk", "summary", "risk"]).unwrap();
    assert_eq!(kinds.len(), 2);

    let empty: [&str; 0] = [];
    assert!(matches!(
        parse_analyses(&empty),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        parse_analyses(&["timeline", "horoscope"]),
        Err(Error::UnknownAgent(_))
    ));
}

#[test]
fn test_agent_kind_serde() {
    let json = serde_json::to_string(&AgentKind::PrivilegeCheck).unwrap();
    assert_eq!(json, "\"privilege_check\"");
}

#[test]
fn test_registry_lookup() {
    let provider = Arc::new(RecordingProvider::replying("{}"));
    let registry = AgentRegistry::llm_backed(provider, AnalysisSettings::default());
    assert_eq!(registry.kinds().len(), AgentKind::ALL.len());
    assert_eq!(registry.get(AgentKind::Risk).unwrap().kind(), AgentKind::Risk);

    let empty = AgentRegistry::new();
    assert!(matches!(
        empty.get(AgentKind::Risk),
        Err(Error::Configuration(_))
    ));
    let wanted: BTreeSet<AgentKind> = [AgentKind::Timeline].into_iter().collect();
    tokio_test::assert_err!(empty.ensure_all(&wanted));
    tokio_test::assert_ok!(registry.ensure_all(&wanted));
}

#[tokio::test]
async fn test_analysis_agent_builds_prompt() {
    let provider = Arc::new(RecordingProvider::replying(
        r#"{"risks": [{"risk": "late payment"}]}"#,
    ));
    let agent = LlmAnalysisAgent::new(
        AgentKind::Risk,
        provider.clone(),
        AnalysisSettings::default(),
    );

    let mut ctx = context(AgentKind::Risk, search_registry());
    ctx.dependencies.insert(
        AgentKind::Discrepancy,
        AgentOutput::text("dates disagree")
            .with_structured(serde_json::json!({"discrepancies": ["signing date"]})),
    );

    let output = agent.run(&ctx).await.unwrap();
    assert_eq!(output.tokens, 120);
    assert_eq!(output.model, "test-model");
    assert_eq!(output.attempts, 1);
    assert_eq!(output.structured.unwrap()["risks"][0]["risk"], "late payment");

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.format, docket_llm::ResponseFormat::Json);
    assert!(request.messages[0].content.contains("case-7"));
    let user = &request.messages[1].content;
    assert!(user.contains("signed on 1 March 2021"));
    assert!(user.contains("discrepancy analysis"));
    assert!(user.contains("signing date"));
}

#[tokio::test]
async fn test_analysis_agent_records_costs() {
    let provider = Arc::new(RecordingProvider::replying("{\"facts\": []}"));
    let agent = LlmAnalysisAgent::new(AgentKind::KeyFacts, provider, AnalysisSettings::default());
    let ctx = context(AgentKind::KeyFacts, search_registry());

    agent.run(&ctx).await.unwrap();

    let summary = ctx.costs.summary(Some(&ctx.run_id.to_string())).await;
    let cost = &summary.by_agent["key_facts"];
    assert_eq!(cost.llm_calls, 1);
    assert_eq!(cost.tool_calls, 1);
    assert_eq!(cost.total_tokens, 120);
    assert!((cost.tool_cost - 0.001).abs() < 1e-9);
}

#[tokio::test]
async fn test_analysis_agent_without_tools() {
    let provider = Arc::new(RecordingProvider::replying("not json at all"));
    let agent = LlmAnalysisAgent::new(
        AgentKind::Timeline,
        provider.clone(),
        AnalysisSettings::default(),
    );
    let ctx = context(AgentKind::Timeline, ToolRegistry::new());

    let output = agent.run(&ctx).await.unwrap();
    assert_eq!(output.content, "not json at all");
    assert!(output.structured.is_none());

    let requests = provider.requests.lock().unwrap();
    assert!(requests[0].messages[1]
        .content
        .contains("No case documents were found"));
}

#[tokio::test]
async fn test_analysis_agent_respects_denials() {
    let mut tools = ToolRegistry::new();
    let mut search = StaticSearch::new();
    search.definition = search.definition.deny_agent("summary");
    tools.register(Arc::new(search));

    let provider = Arc::new(RecordingProvider::replying("{}"));
    let agent = LlmAnalysisAgent::new(AgentKind::Summary, provider, AnalysisSettings::default());
    let ctx = context(AgentKind::Summary, tools);

    agent.run(&ctx).await.unwrap();
    assert_eq!(ctx.tools.stats("search_documents").unwrap().call_count, 0);
}

#[tokio::test]
async fn test_analysis_agent_provider_error() {
    let provider = Arc::new(RecordingProvider::failing(docket_llm::Error::Timeout(30)));
    let agent = LlmAnalysisAgent::new(AgentKind::Timeline, provider, AnalysisSettings::default());
    let ctx = context(AgentKind::Timeline, ToolRegistry::new());

    let err = agent.run(&ctx).await.unwrap_err();
    assert_eq!(err.typed_kind(), Some(crate::error::ErrorKind::Timeout));

    let summary = ctx.costs.summary(None).await;
    assert_eq!(summary.failed_calls, 1);
}

#[test]
fn test_context_debug_hides_handles() {
    let ctx = context(AgentKind::Risk, ToolRegistry::new());
    let debug = format!("{ctx:?}");
    assert!(debug.contains("case-7"));
    assert!(!debug.contains("ToolRegistry"));
    assert_eq!(ctx.tool_context().agent, "risk");
}
