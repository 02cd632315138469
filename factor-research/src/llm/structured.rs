//! Structured (JSON) and plain-text generation on top of a
//! [`CompletionBackend`], with bounded retries and shared conversation context.

use factor_core::{ChatMessage, Conversation};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::json_repair::{repair_json, strip_code_fence};
use super::llm_client::{CompletionBackend, CompletionRequest, LlmError, ResponseFormatKind};
use super::metrics::{MetricsTimer, RequestMetrics};
use super::models::ModelConfig;
use super::prompt_formatter::ResearchPromptFormatter;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Schema keywords rejected by strict `json_schema` response formats
const UNSUPPORTED_STRICT_KEYWORDS: [&str; 17] = [
    "$schema",
    "title",
    "format",
    "default",
    "examples",
    "definitions",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
];

/// Retry budget shared by parse and transport failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total provider calls allowed per request
    pub max_retries: u32,
    /// Base delay after a transport failure, doubled per attempt; parse
    /// failures retry immediately
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_ms: 0,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// Target shape of a structured response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSchema {
    /// Hand-written JSON schema, always sent as prompt instructions
    Raw(Value),
    /// Schema derived from a Rust type; enforced natively (in strict form) by
    /// providers that support `json_schema` responses
    Typed { name: String, schema: Value },
}

impl ResponseSchema {
    pub fn raw(schema: Value) -> Self {
        ResponseSchema::Raw(schema)
    }

    /// Schema of `T` with every subschema inlined
    pub fn typed<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = SchemaSettings::draft07()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<T>();
        let schema = serde_json::to_value(root).unwrap_or_else(|e| {
            tracing::warn!(
                "Could not serialize response schema, falling back to an unconstrained object: {}",
                e
            );
            serde_json::json!({"type": "object", "properties": {}})
        });
        ResponseSchema::Typed {
            name: name.into(),
            schema,
        }
    }

    pub fn schema(&self) -> &Value {
        match self {
            ResponseSchema::Raw(schema) | ResponseSchema::Typed { schema, .. } => schema,
        }
    }

    /// Final user prompt and response format for a model
    fn prepare(&self, model: &ModelConfig, prompt: &str) -> (String, ResponseFormatKind) {
        match self {
            ResponseSchema::Typed { name, schema } if model.supports_native_schema => (
                prompt.to_string(),
                ResponseFormatKind::JsonSchema {
                    name: name.clone(),
                    schema: strict_schema(schema),
                },
            ),
            _ => {
                let mut content = prompt.to_string();
                content.push_str(&ResearchPromptFormatter::schema_instructions(model, self.schema()));
                let format = if model.supports_json_object {
                    ResponseFormatKind::JsonObject
                } else {
                    ResponseFormatKind::Text
                };
                (content, format)
            }
        }
    }
}

/// One generation: model, optional system instruction, user prompt
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub model: &'a ModelConfig,
    pub system: Option<&'a str>,
    pub prompt: &'a str,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(model: &'a ModelConfig, prompt: &'a str) -> Self {
        Self {
            model,
            system: None,
            prompt,
        }
    }

    pub fn with_system(mut self, system: &'a str) -> Self {
        self.system = Some(system);
        self
    }
}

enum Failure {
    Transport(LlmError),
    Parse { error: String, raw: String },
}

/// Sends generation requests through a backend under a retry policy
#[derive(Clone)]
pub struct LlmRequester {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl LlmRequester {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate a JSON value conforming to `schema`
    pub async fn generate_value(
        &self,
        request: GenerationRequest<'_>,
        schema: &ResponseSchema,
        context: Option<&mut Conversation>,
    ) -> Result<Value, LlmError> {
        self.generate_with(request, schema, context, Ok).await
    }

    /// Generate a value and deserialize it into `T`.
    ///
    /// A response that validates against the schema but does not deserialize
    /// into `T` counts as a failed attempt.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        request: GenerationRequest<'_>,
        schema: &ResponseSchema,
        context: Option<&mut Conversation>,
    ) -> Result<T, LlmError> {
        self.generate_with(request, schema, context, |value| {
            serde_json::from_value(value).map_err(|e| e.to_string())
        })
        .await
    }

    async fn generate_with<T, F>(
        &self,
        request: GenerationRequest<'_>,
        schema: &ResponseSchema,
        mut context: Option<&mut Conversation>,
        convert: F,
    ) -> Result<T, LlmError>
    where
        F: Fn(Value) -> Result<T, String>,
    {
        let (content, response_format) = schema.prepare(request.model, request.prompt);
        tracing::debug!("Structured prompt for {}:\n{}", request.model.identifier, content);

        let mut metrics = RequestMetrics::new(&request.model.identifier, content.chars().count());
        let messages = build_messages(request.system, content, context.as_deref_mut());

        // An invalid schema is not the model's fault: skip validation
        let validator = match jsonschema::validator_for(schema.schema()) {
            Ok(validator) => Some(validator),
            Err(e) => {
                tracing::warn!("Response schema is not a valid JSON schema, skipping validation: {}", e);
                None
            }
        };

        let timer = MetricsTimer::start();
        let mut last_failure = None;

        for attempt in 1..=self.policy.max_retries {
            let completion = self
                .backend
                .complete(CompletionRequest {
                    model: request.model,
                    messages: &messages,
                    response_format: &response_format,
                })
                .await;

            let response = match completion {
                Ok(response) => response,
                Err(e) => {
                    metrics.record_transport_failure();
                    tracing::warn!(
                        "Retry {}/{}: LLM call failed: {}",
                        attempt,
                        self.policy.max_retries,
                        e
                    );
                    last_failure = Some(Failure::Transport(e));
                    if attempt < self.policy.max_retries {
                        sleep(self.policy.backoff(attempt)).await;
                    }
                    continue;
                }
            };

            metrics.record_response(response.raw_response.chars().count(), response.tokens_used);

            let parsed = parse_structured(&response.raw_response, validator.as_ref())
                .and_then(|value| convert(value.clone()).map(|typed| (value, typed)));

            match parsed {
                Ok((value, typed)) => {
                    if let Some(context) = context {
                        let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                        context.push(ChatMessage::assistant(pretty));
                    }
                    metrics.set_latency(timer.stop());
                    metrics.report();
                    return Ok(typed);
                }
                Err(error) => {
                    metrics.record_parse_failure();
                    tracing::warn!(
                        "Retry {}/{}: JSON parsing failed: {}",
                        attempt,
                        self.policy.max_retries,
                        error
                    );
                    tracing::debug!("Unparseable response:\n{}", response.raw_response);
                    last_failure = Some(Failure::Parse {
                        error,
                        raw: response.raw_response,
                    });
                }
            }
        }

        metrics.set_latency(timer.stop());
        metrics.report();

        Err(match last_failure {
            Some(Failure::Transport(e)) => e,
            Some(Failure::Parse { error, raw }) => LlmError::UnrecoverableParse {
                attempts: metrics.attempts,
                last_error: error,
                raw: Some(raw),
            },
            None => LlmError::UnrecoverableParse {
                attempts: 0,
                last_error: "retry budget is zero".to_string(),
                raw: None,
            },
        })
    }

    /// Generate free text; the reply is returned and appended to `context`
    /// unchanged
    pub async fn generate_text(
        &self,
        request: GenerationRequest<'_>,
        mut context: Option<&mut Conversation>,
    ) -> Result<String, LlmError> {
        tracing::debug!("Text prompt for {}:\n{}", request.model.identifier, request.prompt);

        let mut metrics = RequestMetrics::new(&request.model.identifier, request.prompt.chars().count());
        let messages = build_messages(request.system, request.prompt.to_string(), context.as_deref_mut());

        let timer = MetricsTimer::start();
        let mut last_error = None;

        for attempt in 1..=self.policy.max_retries {
            let completion = self
                .backend
                .complete(CompletionRequest {
                    model: request.model,
                    messages: &messages,
                    response_format: &ResponseFormatKind::Text,
                })
                .await;

            match completion {
                Ok(response) => {
                    metrics.record_response(response.raw_response.chars().count(), response.tokens_used);
                    if let Some(context) = context {
                        context.push(ChatMessage::assistant(response.raw_response.clone()));
                    }
                    metrics.set_latency(timer.stop());
                    metrics.report();
                    return Ok(response.raw_response);
                }
                Err(e) => {
                    metrics.record_transport_failure();
                    tracing::warn!(
                        "Retry {}/{}: LLM call failed: {}",
                        attempt,
                        self.policy.max_retries,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.policy.max_retries {
                        sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        metrics.set_latency(timer.stop());
        metrics.report();

        Err(last_error.unwrap_or_else(|| LlmError::InvalidRequest("retry budget is zero".to_string())))
    }
}

/// Messages to send for one request.
///
/// With a context, the system message is only added to an empty history and
/// the user message is recorded in it; the whole history is sent. Without a
/// context only `[system?, user]` is sent.
fn build_messages(
    system: Option<&str>,
    user_content: String,
    context: Option<&mut Conversation>,
) -> Vec<ChatMessage> {
    match context {
        Some(context) => {
            if let Some(system) = system {
                if context.is_empty() {
                    context.push(ChatMessage::system(system));
                }
            }
            context.push(ChatMessage::user(user_content));
            context.messages().to_vec()
        }
        None => {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system {
                messages.push(ChatMessage::system(system));
            }
            messages.push(ChatMessage::user(user_content));
            messages
        }
    }
}

/// Strict-mode form of a schema: unsupported keywords removed, every object
/// closed with `additionalProperties: false` and every property required.
/// Optional fields stay expressible through their `null` type.
pub fn strict_schema(schema: &Value) -> Value {
    let mut strict = schema.clone();
    make_strict(&mut strict);
    strict
}

fn make_strict(node: &mut Value) {
    let Value::Object(map) = node else {
        return;
    };

    for keyword in UNSUPPORTED_STRICT_KEYWORDS {
        map.remove(keyword);
    }

    let required = match map.get_mut("properties") {
        Some(Value::Object(properties)) => {
            properties.values_mut().for_each(make_strict);
            Some(properties.keys().cloned().map(Value::String).collect::<Vec<_>>())
        }
        _ => None,
    };

    let declares_object = match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k == "object"),
        _ => false,
    };

    if required.is_some() || declares_object {
        map.insert(
            "required".to_string(),
            Value::Array(required.unwrap_or_default()),
        );
        map.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    for key in ["items", "anyOf", "allOf", "oneOf"] {
        match map.get_mut(key) {
            Some(Value::Array(children)) => children.iter_mut().for_each(make_strict),
            Some(child @ Value::Object(_)) => make_strict(child),
            _ => {}
        }
    }
}

/// Fence strip, repair, parse and validate one response
fn parse_structured(raw: &str, validator: Option<&jsonschema::Validator>) -> Result<Value, String> {
    let repaired = repair_json(strip_code_fence(raw));
    let value: Value = serde_json::from_str(&repaired).map_err(|e| e.to_string())?;

    if let Some(validator) = validator {
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("{}: {}", e.instance_path(), e))
            .collect();
        if !errors.is_empty() {
            return Err(format!("schema validation failed: {}", errors.join("; ")));
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a"]
        })
    }

    fn model(identifier: &str) -> ModelConfig {
        ModelConfig::new(identifier, "key", "http://localhost", 256, 0.1)
    }

    #[test]
    fn test_parse_structured_repairs_quotes() {
        let validator = jsonschema::validator_for(&object_schema()).unwrap();
        let value = parse_structured(
            "```json\n{\"a\": \"he said \"hi\" to me\"}\n```",
            Some(&validator),
        )
        .unwrap();
        assert_eq!(value, json!({"a": "he said \"hi\" to me"}));
    }

    #[test]
    fn test_parse_structured_validation_failure() {
        let validator = jsonschema::validator_for(&object_schema()).unwrap();
        let err = parse_structured("{\"b\": 1}", Some(&validator)).unwrap_err();
        assert!(err.starts_with("schema validation failed"));
    }

    #[test]
    fn test_build_messages_without_context() {
        let messages = build_messages(Some("sys"), "hello".to_string(), None);
        assert_eq!(messages, vec![ChatMessage::system("sys"), ChatMessage::user("hello")]);

        let messages = build_messages(None, "hello".to_string(), None);
        assert_eq!(messages, vec![ChatMessage::user("hello")]);
    }

    #[test]
    fn test_build_messages_system_only_on_empty_context() {
        let mut context = Conversation::new();
        build_messages(Some("sys"), "first".to_string(), Some(&mut context));
        context.push(ChatMessage::assistant("reply"));
        let sent = build_messages(Some("sys"), "second".to_string(), Some(&mut context));

        assert_eq!(sent.len(), 4);
        assert_eq!(sent.iter().filter(|m| m.role == factor_core::ChatRole::System).count(), 1);
        assert_eq!(sent.last(), Some(&ChatMessage::user("second")));
    }

    #[test]
    fn test_raw_schema_prepare() {
        let schema = ResponseSchema::raw(object_schema());

        let (content, format) = schema.prepare(&model("gpt-4"), "prompt");
        assert!(content.starts_with("prompt\n\nYou must respond in valid JSON format"));
        assert_eq!(format, ResponseFormatKind::JsonObject);

        let (_, format) = schema.prepare(&model("DeepSeek-V3"), "prompt");
        assert_eq!(format, ResponseFormatKind::Text);
    }

    #[derive(serde::Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Answer {
        a: String,
    }

    #[test]
    fn test_typed_schema_prepare() {
        let schema = ResponseSchema::typed::<Answer>("answer");
        assert_eq!(schema.schema()["type"], "object");

        let native = model("o3-mini").with_native_schema(true);
        let (content, format) = schema.prepare(&native, "prompt");
        assert_eq!(content, "prompt");
        match format {
            ResponseFormatKind::JsonSchema { name, schema } => {
                assert_eq!(name, "answer");
                assert_eq!(schema["additionalProperties"], false);
            }
            other => panic!("expected json_schema, got {other:?}"),
        }

        // Without native support the schema falls back to instructions
        let (content, format) = schema.prepare(&model("gpt-4"), "prompt");
        assert!(content.contains("You must respond in valid JSON format"));
        assert_eq!(format, ResponseFormatKind::JsonObject);
    }

    #[derive(serde::Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Leg {
        title: String,
        weight: f64,
    }

    #[derive(serde::Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Portfolio {
        /// Rebalance interval in days
        window: Option<u32>,
        legs: Vec<Leg>,
        benchmark: Option<Leg>,
    }

    fn sorted_required(schema: &Value) -> Vec<&str> {
        let mut required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        required.sort_unstable();
        required
    }

    #[test]
    fn test_strict_schema_closes_every_object() {
        let schema = strict_schema(ResponseSchema::typed::<Portfolio>("portfolio").schema());

        assert!(schema.get("$schema").is_none());
        assert!(schema.get("title").is_none());
        assert!(schema.get("definitions").is_none());
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(sorted_required(&schema), vec!["benchmark", "legs", "window"]);

        let window = &schema["properties"]["window"];
        assert_eq!(window["type"], json!(["integer", "null"]));
        assert!(window.get("format").is_none());
        assert!(window.get("minimum").is_none());
        assert_eq!(window["description"], "Rebalance interval in days");

        // A property called "title" is data, not a keyword
        let leg = &schema["properties"]["legs"]["items"];
        assert_eq!(leg["additionalProperties"], false);
        assert_eq!(sorted_required(leg), vec!["title", "weight"]);
        assert!(leg["properties"].get("title").is_some());
        assert!(leg["properties"]["weight"].get("format").is_none());

        let rendered = schema.to_string();
        assert!(!rendered.contains("$ref"));
        assert!(!rendered.contains("\"format\""));
    }

    #[test]
    fn test_strict_schema_keeps_original_for_validation() {
        let schema = ResponseSchema::typed::<Portfolio>("portfolio");
        strict_schema(schema.schema());

        // Optional fields may still be omitted when validating replies
        assert_eq!(schema.schema()["required"], json!(["legs"]));
        let validator = jsonschema::validator_for(schema.schema()).unwrap();
        assert!(validator.is_valid(&json!({"legs": []})));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 100,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(RetryPolicy::immediate(3).backoff(2), Duration::ZERO);
    }
}
