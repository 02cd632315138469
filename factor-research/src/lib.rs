pub mod llm;
pub mod research;

// Re-export commonly used items from llm module
pub use llm::{
    CompletionBackend, CompletionRequest, GenerationRequest, LlmClient, LlmConfig, LlmError,
    LlmRequester, LlmResponse, ModelConfig, ModelRegistry, ResearchPromptFormatter,
    ResponseFormatKind, ResponseSchema, RetryPolicy, Settings,
};

// Re-export commonly used items from research module
pub use research::{extract_code_block, ResearchProcessor};
