//! Agent registry - kind to handler mapping

use super::{Agent, AgentKind, AnalysisSettings, LlmAnalysisAgent};
use crate::error::{Error, Result};
use docket_llm::LlmProvider;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Handlers for each agent kind
#[derive(Clone, Default)]
pub struct AgentRegistry {
    handlers: BTreeMap<AgentKind, Arc<dyn Agent>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AgentRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`LlmAnalysisAgent`] per kind, all sharing `provider`
    #[must_use]
    pub fn llm_backed(provider: Arc<dyn LlmProvider>, settings: AnalysisSettings) -> Self {
        AgentKind::ALL
            .into_iter()
            .fold(Self::new(), |registry, kind| {
                registry.with_agent(Arc::new(LlmAnalysisAgent::new(
                    kind,
                    Arc::clone(&provider),
                    settings.clone(),
                )))
            })
    }

    /// Register a handler, replacing any previous one for the same kind
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let kind = agent.kind();
        debug!(agent = %kind, "Registering agent");
        self.handlers.insert(kind, agent);
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.register(agent);
        self
    }

    /// Handler for `kind`
    pub fn get(&self, kind: AgentKind) -> Result<Arc<dyn Agent>> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("no handler registered for {kind}")))
    }

    /// Whether `kind` has a handler
    #[must_use]
    pub fn contains(&self, kind: AgentKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds
    #[must_use]
    pub fn kinds(&self) -> Vec<AgentKind> {
        self.handlers.keys().copied().collect()
    }

    /// Fail unless every kind in `kinds` has a handler
    pub fn ensure_all(&self, kinds: &BTreeSet<AgentKind>) -> Result<()> {
        match kinds.iter().find(|k| !self.contains(**k)) {
            Some(missing) => Err(Error::Configuration(format!(
                "no handler registered for {missing}"
            ))),
            None => Ok(()),
        }
    }
}
