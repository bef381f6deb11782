//! Provider - LLM provider abstraction
//!
//! Defines the request/response types shared by every provider and the
//! `LlmProvider` trait the analysis agents are written against.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Role in a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl MessageRole {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Expected shape of the model output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text
    #[default]
    Text,
    /// A single JSON object, parsed into `CompletionResponse::structured`
    Json,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Build usage from prompt and completion counts
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Model to use (provider-specific, empty means provider default)
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 1.0)
    pub temperature: Option<f32>,
    /// Expected output format
    pub format: ResponseFormat,
}

impl CompletionRequest {
    /// Create a new completion request
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add messages
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Ask for a JSON object response
    #[must_use]
    pub fn json_output(mut self) -> Self {
        self.format = ResponseFormat::Json;
        self
    }
}

/// Completion response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Parsed JSON payload when the request asked for `ResponseFormat::Json`
    pub structured: Option<serde_json::Value>,
    /// Token usage
    pub usage: Option<TokenUsage>,
    /// Model used
    pub model: String,
}

impl CompletionResponse {
    /// Fill `structured` from `content` according to the requested format.
    ///
    /// Models often wrap JSON in a fenced code block; the fence is stripped
    /// before parsing. Unparsable output leaves `structured` empty and the
    /// raw text in `content`.
    #[must_use]
    pub fn parse_structured(mut self, format: ResponseFormat) -> Self {
        if format == ResponseFormat::Json {
            match extract_json(&self.content) {
                Ok(value) => self.structured = Some(value),
                Err(e) => debug!(error = %e, "Model output is not JSON, keeping text"),
            }
        }
        self
    }
}

/// Parse the first JSON object found in `text`
pub fn extract_json(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&body[start..=end])
            .map_err(|e| Error::InvalidResponse(format!("malformed JSON output: {e}"))),
        _ => Err(Error::InvalidResponse(
            "model output contains no JSON object".to_string(),
        )),
    }
}

/// Trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Complete a conversation
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}
