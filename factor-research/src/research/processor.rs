use factor_core::{Conversation, FactorLogic};

use crate::llm::prompt_formatter::{ANALYST_SYSTEM_PROMPT, STRATEGIST_SYSTEM_PROMPT};
use crate::llm::{
    GenerationRequest, LlmError, LlmRequester, ModelConfig, ResearchPromptFormatter,
    ResponseSchema,
};

/// Research workflow for one report
///
/// Turns report text into factor logic, then into strategy code, and refines
/// that code from execution feedback. All three steps share one conversation,
/// so later requests see the earlier exchange:
///
/// 1. `extract_factor_logic`: structured extraction of the five factor fields
/// 2. `generate_backtest_code`: strategy module implementing the factor
/// 3. `refine_backtest_code`: corrected module given an error or review note
///
/// Call `clear_context` before starting on another report.
pub struct ResearchProcessor {
    model: ModelConfig,
    requester: LlmRequester,
    context: Conversation,
}

impl ResearchProcessor {
    pub fn new(model: ModelConfig, requester: LlmRequester) -> Self {
        tracing::info!(
            "Initializing research processor: model={}, max_retries={}",
            model.identifier,
            requester.policy().max_retries
        );

        Self {
            model,
            requester,
            context: Conversation::new(),
        }
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn context(&self) -> &Conversation {
        &self.context
    }

    /// Extract factor logic from report text
    pub async fn extract_factor_logic(&mut self, report: &str) -> Result<FactorLogic, LlmError> {
        tracing::info!("Extracting factor logic ({} chars of report)", report.chars().count());

        let prompt = ResearchPromptFormatter::format_factor_extraction(report);
        let schema = ResponseSchema::raw(ResearchPromptFormatter::factor_logic_schema());
        let request = GenerationRequest::new(&self.model, &prompt).with_system(ANALYST_SYSTEM_PROMPT);

        let logic: FactorLogic = self
            .requester
            .generate_structured(request, &schema, Some(&mut self.context))
            .await?;

        tracing::info!("Extracted factor: {}", logic.factor_name);
        Ok(logic)
    }

    /// Generate strategy code for extracted factor logic
    pub async fn generate_backtest_code(&mut self, logic: &FactorLogic) -> Result<String, LlmError> {
        tracing::info!("Generating backtest code for {}", logic.factor_name);

        let logic_json = logic
            .to_pretty_json()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;
        let prompt = ResearchPromptFormatter::format_backtest_generation(&logic_json);

        self.request_code(&prompt).await
    }

    /// Revise strategy code given an execution error or review feedback
    pub async fn refine_backtest_code(&mut self, code: &str, feedback: &str) -> Result<String, LlmError> {
        tracing::info!("Refining backtest code with feedback: {}", first_line(feedback));

        let prompt = ResearchPromptFormatter::format_refinement(code, feedback);
        self.request_code(&prompt).await
    }

    /// Forget the conversation so the next call starts a new task
    pub fn clear_context(&mut self) {
        tracing::debug!("Clearing {} context messages", self.context.len());
        self.context.clear();
    }

    async fn request_code(&mut self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerationRequest::new(&self.model, prompt).with_system(STRATEGIST_SYSTEM_PROMPT);
        let reply = self
            .requester
            .generate_text(request, Some(&mut self.context))
            .await?;

        let code = extract_code_block(&reply);
        if code.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        tracing::debug!("Generated code:\n{}", code);
        Ok(code)
    }
}

/// Body of the first fenced code block, preferring a ```` ```python ````
/// block; unfenced text is returned trimmed.
pub fn extract_code_block(text: &str) -> String {
    let fenced = fenced_body(text, "```python").or_else(|| fenced_body(text, "```"));
    fenced.unwrap_or(text).trim().to_string()
}

fn fenced_body<'a>(text: &'a str, opening: &str) -> Option<&'a str> {
    let start = text.find(opening)? + opening.len();
    let rest = &text[start..];
    // Skip whatever follows the fence marker on its line (language tag)
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
    let body = &rest[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
