//! Scripted agents for unit tests

use crate::agents::{Agent, AgentContext, AgentKind, AgentOutput, AgentRegistry};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one attempt does
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Succeed after the agent's latency
    Succeed,
    /// Fail with a retryable error
    Transient,
    /// Fail with a non-retryable error
    Fatal,
    /// Sleep, then succeed
    Hang(Duration),
}

pub(crate) struct ScriptedAgent {
    kind: AgentKind,
    script: Mutex<VecDeque<Script>>,
    fallback: Script,
    latency: Duration,
    calls: AtomicU32,
    seen_dependencies: Mutex<Vec<Vec<AgentKind>>>,
}

impl ScriptedAgent {
    pub(crate) fn new(kind: AgentKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback: Script::Succeed,
            latency: Duration::from_millis(10),
            calls: AtomicU32::new(0),
            seen_dependencies: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_script(self, steps: impl IntoIterator<Item = Script>) -> Self {
        *self.script.lock().unwrap() = steps.into_iter().collect();
        self
    }

    pub(crate) fn with_fallback(mut self, fallback: Script) -> Self {
        self.fallback = fallback;
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen_dependencies(&self) -> Vec<Vec<AgentKind>> {
        self.seen_dependencies.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Agent for ScriptedAgent {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_dependencies
            .lock()
            .unwrap()
            .push(ctx.dependencies.keys().copied().collect());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Script::Succeed => {
                tokio::time::sleep(self.latency).await;
                Ok(AgentOutput::text(format!("{} result", self.kind)))
            }
            Script::Transient => Err(Error::Agent("503 service unavailable".to_string())),
            Script::Fatal => Err(Error::Validation("malformed document".to_string())),
            Script::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(AgentOutput::text(format!("{} late result", self.kind)))
            }
        }
    }
}

/// Registry with a default scripted agent for every kind, plus overrides
pub(crate) fn registry_with(overrides: Vec<Arc<ScriptedAgent>>) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for kind in AgentKind::ALL {
        registry.register(Arc::new(ScriptedAgent::new(kind)));
    }
    for agent in overrides {
        registry.register(agent);
    }
    registry
}
