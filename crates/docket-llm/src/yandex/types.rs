use crate::provider::{Message, TokenUsage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default model
pub const DEFAULT_MODEL: &str = "yandexgpt-lite";

/// Default API URL
pub const DEFAULT_BASE_URL: &str = "https://llm.api.cloud.yandex.net";

/// Credentials accepted by the API
#[derive(Clone, PartialEq, Eq)]
pub enum YandexAuth {
    /// Service account API key, sent as `Api-Key <key>`
    ApiKey(String),
    /// Short-lived IAM token, sent as `Bearer <token>`
    IamToken(String),
}

impl YandexAuth {
    /// Value for the `Authorization` header
    #[must_use]
    pub fn header_value(&self) -> String {
        match self {
            Self::ApiKey(key) => format!("Api-Key {key}"),
            Self::IamToken(token) => format!("Bearer {token}"),
        }
    }
}

impl std::fmt::Debug for YandexAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            Self::IamToken(_) => f.write_str("IamToken([REDACTED])"),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct YandexConfig {
    /// Base URL
    pub base_url: String,
    /// Cloud folder that owns the model
    pub folder_id: String,
    /// Credentials
    pub auth: Option<YandexAuth>,
    /// Default model
    pub default_model: String,
    /// Default max tokens
    pub default_max_tokens: u32,
    /// Default temperature
    pub default_temperature: f32,
    /// HTTP timeout for a single request
    pub timeout: Duration,
}

impl Default for YandexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            folder_id: String::new(),
            auth: None,
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: 2000,
            default_temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

impl YandexConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Reads `YANDEX_FOLDER_ID`, `YANDEX_API_KEY` (or `YANDEX_IAM_TOKEN`),
    /// `YANDEX_MODEL` and `YANDEX_BASE_URL`.
    pub fn from_env() -> Self {
        let auth = std::env::var("YANDEX_API_KEY")
            .ok()
            .map(YandexAuth::ApiKey)
            .or_else(|| std::env::var("YANDEX_IAM_TOKEN").ok().map(YandexAuth::IamToken));

        Self {
            base_url: std::env::var("YANDEX_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            folder_id: std::env::var("YANDEX_FOLDER_ID").unwrap_or_default(),
            auth,
            default_model: std::env::var("YANDEX_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            ..Self::default()
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the folder id
    #[must_use]
    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = folder_id.into();
        self
    }

    /// Set credentials
    #[must_use]
    pub fn with_auth(mut self, auth: YandexAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the default max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `gpt://<folder>/<model>/latest` URI for a model name.
    /// Names that already look like URIs pass through unchanged.
    #[must_use]
    pub fn model_uri(&self, model: &str) -> String {
        if model.starts_with("gpt://") {
            model.to_string()
        } else {
            format!("gpt://{}/{}/latest", self.folder_id, model)
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Request body for `/foundationModels/v1/completion`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexCompletionRequest {
    /// `gpt://folder/model/latest`
    pub model_uri: String,
    /// Sampling options
    pub completion_options: YandexCompletionOptions,
    /// Conversation
    pub messages: Vec<YandexMessage>,
}

/// Sampling options
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexCompletionOptions {
    /// Always false, the provider does not stream
    pub stream: bool,
    /// Sampling temperature
    pub temperature: f32,
    /// The API takes the limit as a decimal string
    pub max_tokens: String,
}

/// One message; Yandex uses `text` where other APIs use `content`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YandexMessage {
    /// system, user or assistant
    pub role: String,
    /// Message text
    pub text: String,
}

impl From<&Message> for YandexMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            text: message.content.clone(),
        }
    }
}

/// Response envelope
#[derive(Debug, Deserialize)]
pub struct YandexCompletionResponse {
    /// Completion result
    pub result: YandexResult,
}

/// Completion result
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexResult {
    /// Generated alternatives, the first one is used
    pub alternatives: Vec<YandexAlternative>,
    /// Token counts
    pub usage: Option<YandexUsage>,
    /// Model version that served the request
    #[serde(default)]
    pub model_version: Option<String>,
}

/// A generated alternative
#[derive(Debug, Deserialize)]
pub struct YandexAlternative {
    /// Generated message
    pub message: YandexMessage,
    /// e.g. `ALTERNATIVE_STATUS_FINAL`
    #[serde(default)]
    pub status: Option<String>,
}

/// Token counts, encoded as decimal strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexUsage {
    /// Prompt tokens
    pub input_text_tokens: String,
    /// Completion tokens
    pub completion_tokens: String,
}

impl YandexUsage {
    /// Convert to the shared usage type; unparsable counts become zero
    #[must_use]
    pub fn to_token_usage(&self) -> TokenUsage {
        TokenUsage::new(
            self.input_text_tokens.parse().unwrap_or(0),
            self.completion_tokens.parse().unwrap_or(0),
        )
    }
}

/// Error body
#[derive(Debug, Deserialize)]
pub struct YandexError {
    /// gRPC-style code
    #[serde(default)]
    pub code: Option<i32>,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}
