use crate::error::{Error, Result};
use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::yandex::types::{
    YandexCompletionOptions, YandexCompletionRequest, YandexCompletionResponse, YandexConfig,
    YandexError, YandexMessage,
};
use reqwest::Client;
use tracing::{debug, instrument, warn};

const COMPLETION_PATH: &str = "/foundationModels/v1/completion";
const MAX_ERROR_LEN: usize = 300;

/// YandexGPT provider
pub struct YandexProvider {
    client: Client,
    config: YandexConfig,
}

impl YandexProvider {
    /// Create a new provider
    pub fn new(config: YandexConfig) -> Result<Self> {
        if config.folder_id.is_empty() {
            return Err(Error::NotConfigured("YANDEX_FOLDER_ID is not set".to_string()));
        }
        if config.auth.is_none() {
            return Err(Error::NotConfigured(
                "neither YANDEX_API_KEY nor YANDEX_IAM_TOKEN is set".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(YandexConfig::from_env())
    }

    /// Provider configuration
    #[must_use]
    pub fn config(&self) -> &YandexConfig {
        &self.config
    }

    fn build_request(&self, request: &CompletionRequest) -> YandexCompletionRequest {
        let model = if request.model.is_empty() {
            self.config.default_model.as_str()
        } else {
            request.model.as_str()
        };

        YandexCompletionRequest {
            model_uri: self.config.model_uri(model),
            completion_options: YandexCompletionOptions {
                stream: false,
                temperature: request
                    .temperature
                    .unwrap_or(self.config.default_temperature),
                max_tokens: request
                    .max_tokens
                    .unwrap_or(self.config.default_max_tokens)
                    .to_string(),
            },
            messages: request.messages.iter().map(YandexMessage::from).collect(),
        }
    }

    async fn send_request(
        &self,
        request: &YandexCompletionRequest,
    ) -> Result<YandexCompletionResponse> {
        let url = format!("{}{}", self.config.base_url, COMPLETION_PATH);
        let auth = self
            .config
            .auth
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("missing credentials".to_string()))?;

        debug!("Sending request to YandexGPT: {}", request.model_uri);

        let response = self
            .client
            .post(&url)
            .header("Authorization", auth.header_value())
            .header("x-folder-id", &self.config.folder_id)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.config.timeout.as_millis() as u64)
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            let error = map_status_error(status, &body);
            warn!(status, error = %error, "YandexGPT request failed");
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

/// Map a non-success HTTP status to an error variant.
///
/// The raw body never reaches the caller beyond a truncated `message` field.
pub(crate) fn map_status_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<YandexError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| format!("HTTP {status}"));
    let message = truncate(&message, MAX_ERROR_LEN);

    match status {
        429 => Error::RateLimit,
        401 | 403 => Error::Authentication(message),
        404 => Error::NotFound(message),
        _ => Error::Api { status, message },
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &text[..end])
}

#[async_trait::async_trait]
impl LlmProvider for YandexProvider {
    fn name(&self) -> &str {
        "yandex"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request);
        let response = self.send_request(&body).await?;

        let result = response.result;
        let content = result
            .alternatives
            .into_iter()
            .next()
            .map(|alt| alt.message.text)
            .ok_or_else(|| Error::InvalidResponse("no alternatives returned".to_string()))?;

        Ok(CompletionResponse {
            content,
            structured: None,
            usage: result.usage.as_ref().map(|u| u.to_token_usage()),
            model: model_name_from_uri(&body.model_uri).to_string(),
        }
        .parse_structured(request.format))
    }
}

/// Model name segment of a `gpt://folder/model/latest` URI
pub(crate) fn model_name_from_uri(uri: &str) -> &str {
    uri.trim_start_matches("gpt://")
        .split('/')
        .nth(1)
        .unwrap_or(uri)
}
