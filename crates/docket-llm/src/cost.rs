//! Cost Tracking - token and cost accounting per agent
//!
//! Every LLM call made by an analysis agent is recorded here together with
//! the run it belongs to, so a run report can show what each agent spent.
//! Tool invocations with a cost estimate are folded into the same summary.

use crate::provider::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;


/// Default cost per 1M input tokens for unknown models
const DEFAULT_INPUT_COST_PER_MILLION: f64 = 5.0;

/// Default cost per 1M output tokens for unknown models
const DEFAULT_OUTPUT_COST_PER_MILLION: f64 = 5.0;

/// Maximum records to keep in memory by default
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Pricing information for a model (per 1M tokens)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model name
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Cost per 1M input tokens
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens
    pub output_cost_per_million: f64,
}

impl ModelPricing {
    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_cost_per_million;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_cost_per_million;
        input_cost + output_cost
    }
}

/// Default pricing for the YandexGPT family
pub fn default_pricing() -> HashMap<String, ModelPricing> {
    [
        ("yandexgpt-lite", 1.6, 1.6),
        ("yandexgpt", 9.6, 9.6),
        ("yandexgpt-32k", 9.6, 9.6),
        ("llama-lite", 1.6, 1.6),
    ]
    .into_iter()
    .map(|(model, input, output)| {
        (
            model.to_string(),
            ModelPricing {
                model: model.to_string(),
                provider: "yandex".to_string(),
                input_cost_per_million: input,
                output_cost_per_million: output,
            },
        )
    })
    .collect()
}

/// What a usage record was spent on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageSource {
    /// An LLM completion
    Llm {
        /// Model name
        model: String,
    },
    /// A tool invocation
    Tool {
        /// Tool name
        tool: String,
    },
}

/// A single usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record ID
    pub id: u64,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Run the usage belongs to
    pub run_id: Option<String>,
    /// Agent that spent it
    pub agent: String,
    /// LLM call or tool call
    pub source: UsageSource,
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
    /// Estimated cost
    pub estimated_cost: f64,
    /// Latency in milliseconds
    pub latency_ms: u64,
    /// Was the call successful?
    pub success: bool,
}

/// Per-agent totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCost {
    /// LLM calls
    pub llm_calls: u64,
    /// Tool calls
    pub tool_calls: u64,
    /// Input + output tokens
    pub total_tokens: u64,
    /// LLM cost
    pub llm_cost: f64,
    /// Tool cost
    pub tool_cost: f64,
}

impl AgentCost {
    /// LLM and tool cost together
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.llm_cost + self.tool_cost
    }
}

/// Aggregated cost summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    /// Total tokens
    pub total_tokens: u64,
    /// Total estimated cost
    pub total_cost: f64,
    /// Successful calls
    pub successful_calls: u64,
    /// Failed calls
    pub failed_calls: u64,
    /// Average LLM latency (ms)
    pub avg_latency_ms: f64,
    /// Totals per agent, ordered by agent name
    pub by_agent: BTreeMap<String, AgentCost>,
}

/// Cost tracker
#[derive(Debug)]
pub struct CostTracker {
    pricing: RwLock<HashMap<String, ModelPricing>>,
    records: RwLock<Vec<UsageRecord>>,
    next_id: AtomicU64,
    max_records: usize,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    /// Create a new cost tracker with default pricing
    #[must_use]
    pub fn new() -> Self {
        Self {
            pricing: RwLock::new(default_pricing()),
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Create with custom max records
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    /// Update pricing for a model
    pub async fn update_pricing(&self, pricing: ModelPricing) {
        let mut prices = self.pricing.write().await;
        prices.insert(pricing.model.clone(), pricing);
    }

    /// Estimate cost for a request
    pub async fn estimate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let prices = self.pricing.read().await;
        match prices.get(model) {
            Some(pricing) => pricing.calculate_cost(input_tokens, output_tokens),
            None => {
                (input_tokens as f64 / 1_000_000.0) * DEFAULT_INPUT_COST_PER_MILLION
                    + (output_tokens as f64 / 1_000_000.0) * DEFAULT_OUTPUT_COST_PER_MILLION
            }
        }
    }

    /// Record an LLM call made by `agent`
    pub async fn record_llm_usage(
        &self,
        run_id: Option<&str>,
        agent: &str,
        model: &str,
        usage: TokenUsage,
        latency_ms: u64,
        success: bool,
    ) -> UsageRecord {
        let estimated_cost = self
            .estimate_cost(model, usage.prompt_tokens, usage.completion_tokens)
            .await;

        self.push(UsageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            run_id: run_id.map(str::to_string),
            agent: agent.to_string(),
            source: UsageSource::Llm {
                model: model.to_string(),
            },
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            estimated_cost,
            latency_ms,
            success,
        })
        .await
    }

    /// Record a tool invocation with a flat cost estimate
    pub async fn record_tool_usage(
        &self,
        run_id: Option<&str>,
        agent: &str,
        tool: &str,
        cost: f64,
        success: bool,
    ) -> UsageRecord {
        self.push(UsageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            run_id: run_id.map(str::to_string),
            agent: agent.to_string(),
            source: UsageSource::Tool {
                tool: tool.to_string(),
            },
            input_tokens: 0,
            output_tokens: 0,
            estimated_cost: cost,
            latency_ms: 0,
            success,
        })
        .await
    }

    async fn push(&self, record: UsageRecord) -> UsageRecord {
        let mut records = self.records.write().await;
        records.push(record.clone());

        if records.len() > self.max_records {
            let drain_count = records.len() - self.max_records;
            records.drain(0..drain_count);
        }

        record
    }

    /// Summary over all records, optionally limited to one run
    pub async fn summary(&self, run_id: Option<&str>) -> CostSummary {
        let records = self.records.read().await;
        let filtered = records
            .iter()
            .filter(|r| run_id.is_none_or(|id| r.run_id.as_deref() == Some(id)));

        let mut summary = CostSummary::default();
        let mut latency_total = 0u64;
        let mut llm_calls = 0u64;

        for record in filtered {
            let tokens = u64::from(record.input_tokens) + u64::from(record.output_tokens);
            summary.total_tokens += tokens;
            summary.total_cost += record.estimated_cost;
            if record.success {
                summary.successful_calls += 1;
            } else {
                summary.failed_calls += 1;
            }

            let agent = summary.by_agent.entry(record.agent.clone()).or_default();
            agent.total_tokens += tokens;
            match record.source {
                UsageSource::Llm { .. } => {
                    agent.llm_calls += 1;
                    agent.llm_cost += record.estimated_cost;
                    latency_total += record.latency_ms;
                    llm_calls += 1;
                }
                UsageSource::Tool { .. } => {
                    agent.tool_calls += 1;
                    agent.tool_cost += record.estimated_cost;
                }
            }
        }

        if llm_calls > 0 {
            summary.avg_latency_ms = latency_total as f64 / llm_calls as f64;
        }

        summary
    }

    /// Get recent records
    pub async fn recent_records(&self, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.read().await;
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }
}

static GLOBAL_TRACKER: OnceLock<Arc<CostTracker>> = OnceLock::new();

/// Get the global cost tracker
#[must_use]
pub fn global_tracker() -> Arc<CostTracker> {
    Arc::clone(GLOBAL_TRACKER.get_or_init(|| Arc::new(CostTracker::new())))
}
