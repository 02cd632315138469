pub mod json_repair;
pub mod llm_client;
pub mod metrics;
pub mod models;
pub mod prompt_formatter;
pub mod structured;

// Re-export commonly used items
pub use json_repair::{repair_json, strip_code_fence};
pub use llm_client::{
    CompletionBackend, CompletionRequest, LlmClient, LlmConfig, LlmError, LlmResponse,
    ResponseFormatKind,
};
pub use metrics::{MetricsTimer, RequestMetrics};
pub use models::{ModelConfig, ModelRegistry, Settings};
pub use prompt_formatter::ResearchPromptFormatter;
pub use structured::{GenerationRequest, LlmRequester, ResponseSchema, RetryPolicy};
