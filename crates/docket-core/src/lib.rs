//! Docket Core - Analysis Orchestration Engine
//!
//! This crate coordinates the analysis agents that examine a legal case:
//! - Agents: the fixed agent table, the `Agent` trait and LLM-backed agents
//! - Planning: dependency-ordered plans and the runnable frontier
//! - Supervision: cached routing decisions and bounded replanning
//! - Execution: concurrent fan-out with retries, breakers and throttling
//! - Retrieval: the case-document seam and the built-in analysis tools
//! - Utils: circuit breaker, retry, rate limiting, adaptive timeouts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod replanner;
pub mod resilience;
pub mod retrieval;
pub mod state;
pub mod supervisor;
pub mod tools;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use agents::{
    parse_analyses, Agent, AgentContext, AgentKind, AgentOutput, AgentRegistry, AgentSpec,
    AnalysisSettings, LlmAnalysisAgent,
};
pub use error::{format_error_for_cli, Error, ErrorKind, Result, UserFriendlyError};
pub use event_bus::{EventBus, RunEvent};
pub use executor::{BatchReport, Executor};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunHandle, RunReport};
pub use planner::{build_plan, dependency_closure, runnable_steps, validate_plan};
pub use replanner::{ReplanAvailability, ReplanPolicy, Replanner};
pub use resilience::{Resilience, ResilienceConfig};
pub use retrieval::{DirectoryRetriever, DocumentChunk, Retriever};
pub use state::{
    AdaptationRecord, ErrorRecord, Plan, PlanStep, ReplanAction, ReplanTrigger, RunState,
    RunStatus, StepStatus,
};
pub use supervisor::{Action, CacheStats, Supervisor};
pub use tools::{register_builtins, PrivilegeLogLookupTool, SearchDocumentsTool};
