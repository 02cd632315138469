use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client as OpenAiClient,
};
use async_trait::async_trait;
use factor_core::{ChatMessage, ChatRole};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::models::ModelConfig;

/// Transport-level configuration shared by every model
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub requests_per_minute: u32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            timeout_seconds: 120,
        }
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    Transport(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Invalid LLM request: {0}")]
    InvalidRequest(String),

    #[error("Could not obtain valid JSON after {attempts} attempts: {last_error}")]
    UnrecoverableParse {
        attempts: u32,
        last_error: String,
        /// Last raw model output, kept for diagnosis
        raw: Option<String>,
    },
}

impl From<OpenAIError> for LlmError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
            other => LlmError::Transport(other.to_string()),
        }
    }
}

/// Output constraint requested from the provider
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormatKind {
    Text,
    JsonObject,
    JsonSchema { name: String, schema: Value },
}

/// One chat completion call
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a ModelConfig,
    pub messages: &'a [ChatMessage],
    pub response_format: &'a ResponseFormatKind,
}

/// Response from the LLM with metadata
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub raw_response: String,
    pub model: String,
    pub tokens_used: Option<u32>,
}

/// Anything that can answer a chat completion.
///
/// The requesters only talk to this trait, so tests swap in scripted
/// backends without any network access.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<LlmResponse, LlmError>;
}

/// OpenAI-compatible chat client with rate limiting.
///
/// Each request is sent to the API base and key of its own [`ModelConfig`],
/// so one client serves OpenAI and DeepSeek endpoints alike.
pub struct LlmClient {
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        tracing::info!(
            "Initializing LLM client: rate_limit={}/min, timeout={}s",
            config.requests_per_minute,
            config.timeout_seconds
        );

        let requests_per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            LlmError::InvalidRequest("requests_per_minute must be > 0".to_string())
        })?;

        let quota = Quota::per_minute(requests_per_minute);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            rate_limiter,
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn openai_client(model: &ModelConfig) -> OpenAiClient<OpenAIConfig> {
        let config = OpenAIConfig::new()
            .with_api_key(model.api_key.as_str())
            .with_api_base(model.api_base.as_str());
        OpenAiClient::with_config(config)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<LlmResponse, LlmError> {
        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        let model = request.model;
        let openai_request = build_request(&request)?;

        tracing::debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            model.identifier,
            model.api_base
        );

        let client = Self::openai_client(model);
        let response = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_seconds),
            client.chat().create(openai_request),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.config.timeout_seconds))??;

        let response_text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(LlmError::EmptyResponse)?;

        tracing::info!(
            "LLM response received: model={}, tokens={:?}, length={} chars",
            response.model,
            response.usage.as_ref().map(|u| u.total_tokens),
            response_text.len()
        );

        Ok(LlmResponse {
            raw_response: response_text,
            model: response.model.clone(),
            tokens_used: response.usage.map(|u| u.total_tokens),
        })
    }
}

/// Provider request for one completion call.
///
/// Reasoning models get `max_completion_tokens` and no temperature; every
/// other model gets `max_tokens` and the configured temperature.
fn build_request(request: &CompletionRequest<'_>) -> Result<CreateChatCompletionRequest, LlmError> {
    let model = request.model;
    let messages = request
        .messages
        .iter()
        .map(to_openai_message)
        .collect::<Result<Vec<_>, _>>()?;

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(model.api_model_name()).messages(messages);

    if model.is_reasoning_model() {
        args.max_completion_tokens(model.max_tokens);
    } else {
        args.max_tokens(model.max_tokens).temperature(model.temperature);
    }

    match request.response_format {
        ResponseFormatKind::Text => {}
        ResponseFormatKind::JsonObject => {
            args.response_format(ResponseFormat::JsonObject);
        }
        ResponseFormatKind::JsonSchema { name, schema } => {
            args.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: name.clone(),
                    schema: Some(schema.clone()),
                    strict: Some(true),
                },
            });
        }
    }

    Ok(args.build()?)
}

fn to_openai_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.as_str();
    Ok(match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.timeout_seconds, 120);
        assert_eq!(config.requests_per_minute, 20);
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let result = LlmClient::new(LlmConfig {
            requests_per_minute: 0,
            ..LlmConfig::default()
        });
        assert!(matches!(result, Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn test_message_conversion_keeps_roles() {
        let converted = to_openai_message(&ChatMessage::system("rules")).unwrap();
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));

        let converted = to_openai_message(&ChatMessage::user("question")).unwrap();
        assert!(matches!(converted, ChatCompletionRequestMessage::User(_)));

        let converted = to_openai_message(&ChatMessage::assistant("answer")).unwrap();
        assert!(matches!(converted, ChatCompletionRequestMessage::Assistant(_)));
    }

    fn serialized(model: &ModelConfig, format: &ResponseFormatKind) -> Value {
        let messages = [ChatMessage::user("question")];
        let request = build_request(&CompletionRequest {
            model,
            messages: &messages,
            response_format: format,
        })
        .unwrap();
        serde_json::to_value(request).unwrap()
    }

    #[test]
    fn test_reasoning_model_request_params() {
        let model = ModelConfig::new("o3-mini", "key", "http://localhost", 4000, 1.0);
        let body = serialized(&model, &ResponseFormatKind::Text);

        assert_eq!(body["model"], "o3-mini");
        assert_eq!(body["max_completion_tokens"], 4000);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_chat_model_request_params() {
        let model = ModelConfig::new("deepseek/deepseek-r1-250120", "key", "http://localhost", 8192, 0.8);
        let body = serialized(&model, &ResponseFormatKind::JsonObject);

        assert_eq!(body["model"], "deepseek-r1-250120");
        assert_eq!(body["max_tokens"], 8192);
        assert!(body.get("max_completion_tokens").is_none());
        assert!((body["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_json_schema_request_is_strict() {
        let model = ModelConfig::new("o3-mini", "key", "http://localhost", 4000, 1.0);
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a"],
            "additionalProperties": false
        });
        let body = serialized(
            &model,
            &ResponseFormatKind::JsonSchema {
                name: "answer".to_string(),
                schema: schema.clone(),
            },
        );

        let json_schema = &body["response_format"]["json_schema"];
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(json_schema["name"], "answer");
        assert_eq!(json_schema["strict"], true);
        assert_eq!(json_schema["schema"], schema);
    }

    #[test]
    fn test_unrecoverable_parse_message() {
        let err = LlmError::UnrecoverableParse {
            attempts: 3,
            last_error: "expected value at line 1".to_string(),
            raw: Some("oops".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Could not obtain valid JSON after 3 attempts: expected value at line 1"
        );
    }
}
