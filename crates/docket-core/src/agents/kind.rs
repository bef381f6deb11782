//! Agent kinds and the static dependency / priority table

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Every analysis the orchestrator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Document type and matter classification
    Classification,
    /// Attorney-client privilege screening
    PrivilegeCheck,
    /// People, organisations, places
    EntityExtraction,
    /// Long-form legal analysis
    DeepAnalysis,
    /// Chronology of events
    Timeline,
    /// Material facts
    KeyFacts,
    /// Contradictions between documents
    Discrepancy,
    /// Links between extracted entities
    Relationship,
    /// Legal risk assessment
    Risk,
    /// Case summary
    Summary,
}

/// One row of the agent table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSpec {
    /// Agent
    pub kind: AgentKind,
    /// Agents whose results must be present first
    pub dependencies: &'static [AgentKind],
    /// Lower runs first when several agents are runnable
    pub priority: u8,
    /// Per-attempt deadline unless overridden by configuration
    pub default_timeout: Duration,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

impl AgentKind {
    /// All agents, in declaration order
    pub const ALL: [AgentKind; 10] = [
        AgentKind::Classification,
        AgentKind::PrivilegeCheck,
        AgentKind::EntityExtraction,
        AgentKind::DeepAnalysis,
        AgentKind::Timeline,
        AgentKind::KeyFacts,
        AgentKind::Discrepancy,
        AgentKind::Relationship,
        AgentKind::Risk,
        AgentKind::Summary,
    ];

    /// Canonical name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::PrivilegeCheck => "privilege_check",
            Self::EntityExtraction => "entity_extraction",
            Self::DeepAnalysis => "deep_analysis",
            Self::Timeline => "timeline",
            Self::KeyFacts => "key_facts",
            Self::Discrepancy => "discrepancy",
            Self::Relationship => "relationship",
            Self::Risk => "risk",
            Self::Summary => "summary",
        }
    }

    /// Table row for this agent
    #[must_use]
    pub fn spec(&self) -> AgentSpec {
        let (dependencies, priority, default_timeout): (&'static [AgentKind], u8, Duration) =
            match self {
                Self::Classification => (&[], 1, Duration::from_secs(60)),
                Self::PrivilegeCheck => (&[], 2, DEFAULT_TIMEOUT),
                Self::EntityExtraction => (&[], 3, DEFAULT_TIMEOUT),
                Self::DeepAnalysis => (&[], 3, DEFAULT_TIMEOUT),
                Self::Timeline => (&[], 4, DEFAULT_TIMEOUT),
                Self::KeyFacts => (&[], 4, DEFAULT_TIMEOUT),
                Self::Discrepancy => (&[], 5, Duration::from_secs(180)),
                Self::Relationship => (&[Self::EntityExtraction], 6, DEFAULT_TIMEOUT),
                Self::Risk => (&[Self::Discrepancy], 7, Duration::from_secs(180)),
                Self::Summary => (&[Self::KeyFacts], 8, DEFAULT_TIMEOUT),
            };
        AgentSpec {
            kind: *self,
            dependencies,
            priority,
            default_timeout,
        }
    }

    /// Direct dependencies
    #[must_use]
    pub fn dependencies(&self) -> &'static [AgentKind] {
        self.spec().dependencies
    }

    /// Scheduling priority (lower first)
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.spec().priority
    }

    /// Sort key: priority, then name
    #[must_use]
    pub fn schedule_key(&self) -> (u8, &'static str) {
        (self.priority(), self.as_str())
    }

    /// Agents that list `self` as a direct dependency
    #[must_use]
    pub fn dependents(&self) -> Vec<AgentKind> {
        Self::ALL
            .into_iter()
            .filter(|k| k.dependencies().contains(self))
            .collect()
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| Error::UnknownAgent(s.trim().to_string()))
    }
}

/// Parse requested analysis names.
///
/// Duplicates collapse; an empty request or any unknown name is a
/// configuration error.
pub fn parse_analyses<S: AsRef<str>>(names: &[S]) -> Result<BTreeSet<AgentKind>> {
    let requested = names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| !n.trim().is_empty())
        .map(str::parse)
        .collect::<Result<BTreeSet<AgentKind>>>()?;

    if requested.is_empty() {
        return Err(Error::Configuration("no analyses requested".to_string()));
    }
    Ok(requested)
}
