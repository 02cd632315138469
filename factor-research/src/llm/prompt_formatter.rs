use factor_core::FactorLogic;
use serde_json::{json, Value};

use super::models::ModelConfig;

/// System prompt for factor extraction
pub const ANALYST_SYSTEM_PROMPT: &str = "你是一个专业的量化金融分析师，精通因子挖掘和策略构建。";

/// System prompt for strategy code generation and refinement
pub const STRATEGIST_SYSTEM_PROMPT: &str = "你是一个专业的量化策略师，精通Python和vnpy回测框架。";

/// Entry point every generated strategy module must define
pub const STRATEGY_ENTRY_POINT: &str =
    "def run_strategy(start_date: str, end_date: str, initial_capital: float) -> dict";

/// Formatter for research prompts
pub struct ResearchPromptFormatter;

impl ResearchPromptFormatter {
    /// Ask for the five factor-logic fields of a report
    pub fn format_factor_extraction(report: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str("请分析以下量化研究报告，并提取其中的因子逻辑。\n");
        prompt.push_str("需要包括以下内容：\n");
        prompt.push_str("1. 因子名称\n");
        prompt.push_str("2. 因子定义和计算逻辑\n");
        prompt.push_str("3. 因子参数\n");
        prompt.push_str("4. 数据要求\n");
        prompt.push_str("5. 选股逻辑\n\n");
        prompt.push_str("研究报告：\n");
        prompt.push_str(report);
        prompt.push('\n');

        prompt
    }

    /// Ask for a runnable backtest module implementing the factor
    pub fn format_backtest_generation(factor_logic_json: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str("请根据以下因子逻辑，编写一个基于vnpy的回测代码。\n");
        prompt.push_str("代码需要包括：\n");
        prompt.push_str("1. 因子计算\n");
        prompt.push_str("2. 选股逻辑\n");
        prompt.push_str("3. 回测设置\n");
        prompt.push_str("4. 性能评估\n\n");
        prompt.push_str("因子逻辑：\n");
        prompt.push_str(factor_logic_json);
        prompt.push_str("\n\n");
        prompt.push_str(&Self::strategy_contract());
        prompt.push_str("\n请确保代码可以直接运行，并且符合vnpy框架的接口规范。\n");

        prompt
    }

    /// Ask for a corrected version of strategy code given execution feedback
    pub fn format_refinement(code: &str, feedback: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str("请根据以下反馈修改vnpy回测代码。\n\n");
        prompt.push_str("当前代码：\n");
        prompt.push_str("```python\n");
        prompt.push_str(code.trim_end());
        prompt.push_str("\n```\n\n");
        prompt.push_str("反馈或错误信息：\n");
        prompt.push_str(feedback);
        prompt.push_str("\n\n");
        prompt.push_str(&Self::strategy_contract());
        prompt.push_str("\n请修正代码中的问题，确保可以正常执行。\n");

        prompt
    }

    /// Interface the backtest runner calls into
    pub fn strategy_contract() -> String {
        let mut contract = String::new();

        contract.push_str("代码接口要求：\n");
        contract.push_str(&format!("- 模块必须定义顶层函数 `{}`\n", STRATEGY_ENTRY_POINT));
        contract.push_str("- start_date 与 end_date 为 YYYY-MM-DD 格式的字符串\n");
        contract.push_str(
            "- 返回字典 {\"daily_returns\": [...]}，按交易日顺序给出策略每日收益率（小数，例如 0.01 表示 1%）\n",
        );
        contract.push_str("- 模块被导入时不得自动执行回测\n");
        contract.push_str("- 只输出一个 ```python 代码块\n");

        contract
    }

    /// Schema instructions appended to a prompt when the provider cannot
    /// enforce the schema itself
    pub fn schema_instructions(model: &ModelConfig, schema: &Value) -> String {
        let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());

        if model.is_deepseek() {
            format!(
                "\n\n您必须按照此模式以有效的JSON格式进行响应（注意字符串中的双引号需要转义）：\n{}",
                rendered
            )
        } else {
            format!(
                "\n\nYou must respond in valid JSON format according to this schema:\n{}",
                rendered
            )
        }
    }

    /// Schema of the factor-logic record returned by extraction
    pub fn factor_logic_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "factor_name": {"type": "string", "description": "因子名称"},
                "definition": {"type": "string", "description": "因子定义和计算逻辑"},
                "parameters": {"type": "array", "items": {"type": "object"}, "description": "因子参数列表"},
                "data_requirements": {"type": "array", "items": {"type": "string"}, "description": "所需数据列表"},
                "stock_selection": {"type": "string", "description": "选股逻辑"}
            },
            "required": FactorLogic::REQUIRED_FIELDS
        })
    }
}
