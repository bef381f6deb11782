//! Application configuration
//!
//! Loaded from embedded defaults, optional files and `DOCKET_*`
//! environment variables, then converted into the library config types.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use docket_core::agents::AnalysisSettings;
use docket_core::utils::{
    AdaptiveTimeoutConfig, CircuitBreakerConfig, RateLimitConfig, RetryPolicy,
};
use docket_core::{AgentKind, OrchestratorConfig, ReplanPolicy, ResilienceConfig};
use docket_llm::YandexConfig;
use docket_tools::Sensitivity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;


/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub orchestrator: OrchestratorSettings,
    pub resilience: ResilienceSettings,
    pub retrieval: RetrievalSettings,
    pub logging: LoggingSettings,
}

/// LLM provider settings. Credentials come from `YANDEX_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: Option<String>,
    pub folder_id: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub context_chunks: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            folder_id: None,
            model: YandexConfig::default().default_model,
            max_tokens: 2000,
            temperature: 0.2,
            timeout_secs: 120,
            context_chunks: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
            jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplanSettings {
    pub max_attempts: u32,
    pub cooldown_secs: u64,
    pub min_completed: usize,
    pub error_trigger: u32,
    pub max_step_failures: usize,
    pub stall_threshold: u32,
}

impl Default for ReplanSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown_secs: 60,
            min_completed: 2,
            error_trigger: 3,
            max_step_failures: 2,
            stall_threshold: 3,
        }
    }
}

/// Orchestrator settings (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Agents dispatched together at most
    pub max_concurrency: usize,
    pub decision_cache_size: usize,
    pub wait_poll_ms: u64,
    pub run_deadline_secs: Option<u64>,
    pub max_tool_sensitivity: Sensitivity,
    /// Per-agent deadline overrides in seconds, keyed by agent name
    pub agent_timeouts: BTreeMap<String, u64>,
    pub retry: RetrySettings,
    pub replan: ReplanSettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            decision_cache_size: 100,
            wait_poll_ms: 1000,
            run_deadline_secs: None,
            max_tool_sensitivity: Sensitivity::High,
            agent_timeouts: BTreeMap::new(),
            retry: RetrySettings::default(),
            replan: ReplanSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_second: f64,
    pub bucket_size: u32,
    pub max_concurrent: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 5.0,
            bucket_size: 10,
            max_concurrent: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_rate_threshold: f64,
    pub minimum_calls: u32,
    pub window_secs: u64,
    pub cooldown_secs: u64,
    pub half_open_max_calls: u32,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_calls: 3,
            window_secs: 300,
            cooldown_secs: 60,
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveTimeoutSettings {
    pub window: usize,
    pub min_samples: usize,
    pub k: f64,
    pub margin_ms: u64,
}

impl Default for AdaptiveTimeoutSettings {
    fn default() -> Self {
        Self {
            window: 100,
            min_samples: 5,
            k: 2.0,
            margin_ms: 5000,
        }
    }
}

/// Shared resilience settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub rate_limit: RateLimitSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub adaptive_timeout: AdaptiveTimeoutSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Root holding one folder of documents per case
    pub documents_dir: PathBuf,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            documents_dir: PathBuf::from("data/cases"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Also write a daily rolling log file here
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Orchestrator settings as the library type
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let settings = &self.orchestrator;
        let retry = RetryPolicy::new()
            .with_max_retries(settings.retry.max_retries)
            .with_base_delay(Duration::from_millis(settings.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(settings.retry.max_delay_ms))
            .with_exponential_base(settings.retry.exponential_base)
            .with_jitter(settings.retry.jitter);
        let replan = ReplanPolicy::new()
            .with_max_attempts(settings.replan.max_attempts)
            .with_cooldown(Duration::from_secs(settings.replan.cooldown_secs))
            .with_min_completed(settings.replan.min_completed)
            .with_error_trigger(settings.replan.error_trigger)
            .with_max_step_failures(settings.replan.max_step_failures)
            .with_stall_threshold(settings.replan.stall_threshold);

        let mut config = OrchestratorConfig::new()
            .with_max_fan_out(settings.max_concurrency.max(1))
            .with_retry(retry)
            .with_replan(replan)
            .with_decision_cache_size(settings.decision_cache_size)
            .with_wait_poll_interval(Duration::from_millis(settings.wait_poll_ms))
            .with_max_tool_sensitivity(settings.max_tool_sensitivity);

        for (name, secs) in &settings.agent_timeouts {
            let agent: AgentKind = name
                .parse()
                .with_context(|| format!("orchestrator.agent_timeouts.{name}"))?;
            config = config.with_agent_timeout(agent, Duration::from_secs(*secs));
        }
        if let Some(secs) = settings.run_deadline_secs {
            config = config.with_run_deadline(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Resilience settings as the library type
    pub fn resilience_config(&self) -> Result<ResilienceConfig> {
        let r = &self.resilience;
        let rps = r.rate_limit.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            bail!("resilience.rate_limit.requests_per_second must be positive, got {rps}");
        }
        let k = r.adaptive_timeout.k;
        if !k.is_finite() || k < 0.0 {
            bail!("resilience.adaptive_timeout.k must be zero or positive, got {k}");
        }
        Ok(ResilienceConfig {
            rate_limit: RateLimitConfig::new()
                .with_requests_per_second(r.rate_limit.requests_per_second)
                .with_bucket_size(r.rate_limit.bucket_size)
                .with_max_concurrent(r.rate_limit.max_concurrent),
            circuit_breaker: CircuitBreakerConfig::new()
                .with_failure_rate_threshold(r.circuit_breaker.failure_rate_threshold)
                .with_minimum_calls(r.circuit_breaker.minimum_calls)
                .with_window(Duration::from_secs(r.circuit_breaker.window_secs))
                .with_cooldown(Duration::from_secs(r.circuit_breaker.cooldown_secs))
                .with_half_open_max_calls(r.circuit_breaker.half_open_max_calls)
                .with_success_threshold(r.circuit_breaker.success_threshold),
            adaptive_timeout: AdaptiveTimeoutConfig::new()
                .with_window(r.adaptive_timeout.window)
                .with_min_samples(r.adaptive_timeout.min_samples)
                .with_k(r.adaptive_timeout.k)
                .with_margin(Duration::from_millis(r.adaptive_timeout.margin_ms)),
        })
    }

    /// Provider config: environment credentials, file settings on top
    pub fn yandex_config(&self) -> YandexConfig {
        let mut config = YandexConfig::from_env()
            .with_model(self.llm.model.clone())
            .with_max_tokens(self.llm.max_tokens)
            .with_timeout(Duration::from_secs(self.llm.timeout_secs));
        if let Some(url) = &self.llm.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(folder) = &self.llm.folder_id {
            config = config.with_folder(folder.clone());
        }
        config
    }

    /// Prompt settings for the analysis agents
    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            context_chunks: self.llm.context_chunks,
        }
    }
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var("DOCKET_ENV").unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority), DOCKET_LLM__MODEL style
        .add_source(
            Environment::with_prefix("DOCKET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
