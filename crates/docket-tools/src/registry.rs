//! Registry - Tool registration and per-agent access
//!
//! Tools are registered once with a sensitivity tier and allow/deny agent
//! sets. Lookup for an agent applies explicit denials first, then the
//! sensitivity ceiling, then an optional tag filter. Every invocation goes
//! through [`ToolRegistry::invoke`], which records who called what and
//! keeps a running call count and cost per tool.

use crate::error::{Error, Result};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};


/// Maximum usage entries kept in memory
const MAX_USAGE_LOG: usize = 1_000;

/// Cost is accumulated in millionths to stay lock-free
const COST_SCALE: f64 = 1_000_000.0;

/// Sensitivity tier of a tool, ordered from least to most sensitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Public or case-internal read-only data
    Low,
    /// Derived work product
    Medium,
    /// Privileged or client-confidential material
    High,
    /// Material that must never leave the firm
    Critical,
}

impl Sensitivity {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(Error::InvalidInput(format!("unknown sensitivity: {other}"))),
        }
    }
}

/// Tool metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema for parameters
    pub parameters: serde_json::Value,
    /// Sensitivity tier
    pub sensitivity: Sensitivity,
    /// Agents allowed to call the tool; empty means every agent
    #[serde(default)]
    pub allowed_agents: BTreeSet<String>,
    /// Agents never allowed to call the tool
    #[serde(default)]
    pub denied_agents: BTreeSet<String>,
    /// Free-form tags for filtering
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Estimated cost of one call
    pub cost_estimate: f64,
    /// Maximum calls per minute
    pub rate_limit: Option<u32>,
    /// Whether the tool is enabled
    pub enabled: bool,
}

impl ToolDefinition {
    /// Create a new tool definition
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            sensitivity: Sensitivity::Low,
            allowed_agents: BTreeSet::new(),
            denied_agents: BTreeSet::new(),
            tags: BTreeSet::new(),
            cost_estimate: 0.0,
            rate_limit: None,
            enabled: true,
        }
    }

    /// Set the parameters schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the sensitivity tier
    #[must_use]
    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Allow an agent (restricts the tool to the allowed set)
    #[must_use]
    pub fn allow_agent(mut self, agent: impl Into<String>) -> Self {
        self.allowed_agents.insert(agent.into());
        self
    }

    /// Deny an agent
    #[must_use]
    pub fn deny_agent(mut self, agent: impl Into<String>) -> Self {
        self.denied_agents.insert(agent.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the per-call cost estimate
    #[must_use]
    pub fn with_cost_estimate(mut self, cost: f64) -> Self {
        self.cost_estimate = cost;
        self
    }

    /// Limit calls per minute
    #[must_use]
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = Some(per_minute);
        self
    }

    /// Set enabled status
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether `agent` passes the allow/deny sets
    #[must_use]
    pub fn permits(&self, agent: &str) -> bool {
        if self.denied_agents.contains(agent) {
            return false;
        }
        self.allowed_agents.is_empty() || self.allowed_agents.contains(agent)
    }
}

/// Call context handed to every tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContext {
    /// Case the run is analysing
    pub case_id: String,
    /// Run identifier
    pub run_id: String,
    /// Calling agent
    pub agent: String,
}

impl ToolContext {
    /// Create a new context
    #[must_use]
    pub fn new(
        case_id: impl Into<String>,
        run_id: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            run_id: run_id.into(),
            agent: agent.into(),
        }
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Output data
    pub output: serde_json::Value,
    /// Error message if failed
    pub error: Option<String>,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
    /// Cost charged for the call
    #[serde(default)]
    pub cost: f64,
}

impl ToolResult {
    /// Create a successful result
    #[must_use]
    pub fn success(output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration_ms,
            cost: 0.0,
        }
    }

    /// Create a failed result
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            duration_ms,
            cost: 0.0,
        }
    }
}

/// Trait for tool implementations
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with given input
    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> Result<ToolResult>;

    /// Validate input before execution
    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        if !input.is_object() {
            return Err(Error::InvalidInput("Input must be an object".to_string()));
        }
        Ok(())
    }
}

/// One recorded invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsage {
    /// Tool name
    pub tool: String,
    /// Calling agent
    pub agent: String,
    /// Run identifier
    pub run_id: String,
    /// When the call started
    pub timestamp: DateTime<Utc>,
    /// Whether it succeeded
    pub success: bool,
}

/// Running totals for one tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    /// Number of invocations
    pub call_count: u64,
    /// Accumulated cost estimate
    pub total_cost: f64,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    cost_micros: AtomicU64,
}

struct Entry {
    tool: Arc<dyn Tool>,
    definition: ToolDefinition,
    counters: Counters,
}

/// Registry for analysis tools
pub struct ToolRegistry {
    entries: HashMap<String, Entry>,
    limiter: RateLimiter,
    usage: Mutex<VecDeque<ToolUsage>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            limiter: RateLimiter::new(),
            usage: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a tool. Registering the same name twice replaces the
    /// earlier tool and resets its counters.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.definition().clone();
        let name = definition.name.clone();
        debug!(tool = %name, sensitivity = %definition.sensitivity, "Registering tool");
        if self.entries.contains_key(&name) {
            warn!(tool = %name, "Tool registered twice, replacing");
        }
        self.entries.insert(
            name,
            Entry {
                tool,
                definition,
                counters: Counters::default(),
            },
        );
    }

    /// Get a tool definition by name
    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.entries.get(name).map(|e| &e.definition)
    }

    /// Check if a tool exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// List all tool names, sorted
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Tools `agent` may call at or below `max_sensitivity`.
    ///
    /// Denials are applied first, then the sensitivity ceiling, then the
    /// tag filter (a tool matches when it carries any of `tags`; an empty
    /// slice disables the filter). Disabled tools are never returned.
    #[must_use]
    pub fn get_tools_for_agent(
        &self,
        agent: &str,
        max_sensitivity: Sensitivity,
        tags: &[&str],
    ) -> Vec<&ToolDefinition> {
        let mut tools: Vec<&ToolDefinition> = self
            .entries
            .values()
            .map(|e| &e.definition)
            .filter(|d| d.enabled)
            .filter(|d| d.permits(agent))
            .filter(|d| d.sensitivity <= max_sensitivity)
            .filter(|d| tags.is_empty() || tags.iter().any(|t| d.tags.contains(*t)))
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Invoke `name` on behalf of `ctx.agent`.
    ///
    /// Access is decided from the allow/deny sets; the call is then
    /// rate-limited, executed and accounted whether or not it succeeds.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ToolContext,
        input: serde_json::Value,
    ) -> Result<ToolResult> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let definition = &entry.definition;

        if !definition.enabled {
            return Err(Error::Disabled(name.to_string()));
        }
        if !definition.permits(&ctx.agent) {
            return Err(Error::PermissionDenied(format!(
                "agent {} may not call {}",
                ctx.agent, name
            )));
        }
        if let Some(per_minute) = definition.rate_limit {
            let limit = self
                .limiter
                .acquire(name, RateLimitConfig::per_minute(per_minute))
                .await;
            if !limit.allowed {
                return Err(Error::RateLimited {
                    tool: name.to_string(),
                    retry_after_ms: limit.reset_after.as_millis() as u64,
                });
            }
        }

        entry.tool.validate_input(&input)?;

        let timestamp = Utc::now();
        let start = Instant::now();
        let outcome = entry.tool.execute(ctx, input).await;
        let elapsed = start.elapsed().as_millis() as u64;

        entry.counters.calls.fetch_add(1, Ordering::Relaxed);
        entry.counters.cost_micros.fetch_add(
            (definition.cost_estimate * COST_SCALE).round() as u64,
            Ordering::Relaxed,
        );

        let success = matches!(&outcome, Ok(r) if r.success);
        self.record_usage(ToolUsage {
            tool: name.to_string(),
            agent: ctx.agent.clone(),
            run_id: ctx.run_id.clone(),
            timestamp,
            success,
        });
        debug!(tool = %name, agent = %ctx.agent, success, elapsed_ms = elapsed, "Tool invoked");

        outcome.map(|mut result| {
            result.cost = definition.cost_estimate;
            if result.duration_ms == 0 {
                result.duration_ms = elapsed;
            }
            result
        })
    }

    fn record_usage(&self, usage: ToolUsage) {
        let mut log = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        log.push_back(usage);
        while log.len() > MAX_USAGE_LOG {
            log.pop_front();
        }
    }

    /// Running totals for one tool
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<ToolStats> {
        self.entries.get(name).map(|e| ToolStats {
            call_count: e.counters.calls.load(Ordering::Relaxed),
            total_cost: e.counters.cost_micros.load(Ordering::Relaxed) as f64 / COST_SCALE,
        })
    }

    /// Accumulated cost over all tools
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.entries
            .keys()
            .filter_map(|name| self.stats(name))
            .map(|s| s.total_cost)
            .sum()
    }

    /// Most recent invocations, oldest first
    #[must_use]
    pub fn recent_usage(&self, limit: usize) -> Vec<ToolUsage> {
        let log = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    /// Enable a tool
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a tool
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.definition.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Get tool count
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
