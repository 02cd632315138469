use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Factor logic distilled from a research report.
///
/// The five named fields are required in every extraction. Any other keys the
/// model returns are kept in `extra` so a saved record survives a
/// load/save round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorLogic {
    /// Factor name
    pub factor_name: String,

    /// Definition and calculation logic
    pub definition: String,

    /// Parameter list, one object per parameter
    pub parameters: Vec<Map<String, Value>>,

    /// Required input data (prices, fundamentals, ...)
    pub data_requirements: Vec<String>,

    /// Stock selection rule built on the factor value
    pub stock_selection: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FactorLogic {
    pub const REQUIRED_FIELDS: [&'static str; 5] = [
        "factor_name",
        "definition",
        "parameters",
        "data_requirements",
        "stock_selection",
    ];

    /// Build a record from a parsed JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("JSON value is not a valid factor logic record")
    }

    /// Convert back into a JSON mapping, extra keys included
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("failed to serialize factor logic")
    }

    /// Pretty-printed JSON, used when the record is embedded in prompts
    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize factor logic")
    }
}
