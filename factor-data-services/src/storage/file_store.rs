use anyhow::{Context, Result};
use chrono::Local;
use factor_core::{
    FactorLogic, PerformanceReport, ProcessedReport, ReportMetadata, FILE_TIMESTAMP_FORMAT,
};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w]").expect("static regex"));

/// Processed report file names keep at most this many title characters
const MAX_REPORT_STEM_CHARS: usize = 30;

const UNKNOWN_FACTOR: &str = "unknown_factor";

/// Replace every non-word character with `_` so the name is safe on any filesystem
pub fn safe_file_stem(name: &str) -> String {
    NON_WORD.replace_all(name, "_").into_owned()
}

/// Local timestamp suffix for artifact names (second granularity)
pub fn file_timestamp() -> String {
    Local::now().format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// File-backed store for every artifact of a replication run.
///
/// Layout under the data directory:
/// - `reports/processed/` cleaned reports with metadata
/// - `factors/` extracted factor logic
/// - `backtest_code/` generated strategy code
/// - `results/` performance reports
///
/// Names carry a second-granular timestamp; two saves of the same name within
/// one second overwrite each other.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn processed_reports_dir(&self) -> PathBuf {
        self.root.join("reports").join("processed")
    }

    pub fn factors_dir(&self) -> PathBuf {
        self.root.join("factors")
    }

    pub fn backtest_code_dir(&self) -> PathBuf {
        self.root.join("backtest_code")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    /// Save cleaned report text together with its metadata
    pub fn save_processed_report(&self, content: &str, metadata: &ReportMetadata) -> Result<PathBuf> {
        let stem: String = safe_file_stem(&metadata.title)
            .chars()
            .take(MAX_REPORT_STEM_CHARS)
            .collect();
        let path = self
            .processed_reports_dir()
            .join(format!("{}_{}.json", stem, file_timestamp()));

        let report = ProcessedReport {
            metadata: metadata.clone(),
            content: content.to_string(),
        };
        write_json(&path, &report)?;

        tracing::info!("Processed report saved to {}", path.display());
        Ok(path)
    }

    /// Save extracted factor logic.
    ///
    /// The file is named after `name` when given, otherwise after the record's
    /// own `factor_name`.
    pub fn save_factor_logic(&self, logic: &FactorLogic, name: Option<&str>) -> Result<PathBuf> {
        let name = name.unwrap_or(&logic.factor_name);
        self.save_factor_value(&logic.to_value()?, Some(name))
    }

    /// Save model output that may or may not be JSON.
    ///
    /// Text that parses as JSON is stored as-is; anything else is wrapped as
    /// `{"factor_text": ...}`.
    pub fn save_factor_text(&self, text: &str, name: Option<&str>) -> Result<PathBuf> {
        let value = serde_json::from_str::<Value>(text).unwrap_or_else(|_| json!({ "factor_text": text }));
        self.save_factor_value(&value, name)
    }

    /// Save an arbitrary factor mapping
    pub fn save_factor_value(&self, value: &Value, name: Option<&str>) -> Result<PathBuf> {
        let name = name
            .filter(|n| !n.is_empty())
            .or_else(|| value.get("factor_name").and_then(Value::as_str))
            .unwrap_or(UNKNOWN_FACTOR);

        let path = self
            .factors_dir()
            .join(format!("{}_{}.json", safe_file_stem(name), file_timestamp()));
        write_json(&path, value)?;

        tracing::info!("Factor logic saved to {}", path.display());
        Ok(path)
    }

    /// Load a saved factor file as a raw JSON mapping
    pub fn load_factor_json(path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Factor file not found: {}", path.display());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read factor file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Factor file {} is not valid JSON", path.display()))
    }

    /// Load a saved factor file as a typed record
    pub fn load_factor_logic(path: impl AsRef<Path>) -> Result<FactorLogic> {
        FactorLogic::from_value(Self::load_factor_json(path)?)
    }

    /// Save generated strategy code as `backtest_<timestamp>.py`
    pub fn save_backtest_code(&self, code: &str) -> Result<PathBuf> {
        let dir = self.backtest_code_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(format!("backtest_{}.py", file_timestamp()));
        std::fs::write(&path, code)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!("Backtest code saved to {}", path.display());
        Ok(path)
    }

    /// Save a performance report under the factor's name
    pub fn save_result(&self, performance: &PerformanceReport, factor_name: &str) -> Result<PathBuf> {
        let path = self.results_dir().join(format!(
            "{}_{}.json",
            safe_file_stem(factor_name),
            file_timestamp()
        ));
        write_json(&path, performance)?;

        tracing::info!("Backtest result saved to {}", path.display());
        Ok(path)
    }
}

/// Pretty-printed UTF-8 JSON, non-ASCII kept verbatim
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let text = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_stem() {
        assert_eq!(safe_file_stem("Momentum Factor!!"), "Momentum_Factor__");
        assert_eq!(safe_file_stem("动量/反转 因子"), "动量_反转_因子");
        assert_eq!(safe_file_stem("already_safe"), "already_safe");
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = file_timestamp();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "_");
        assert!(ts.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_save_factor_text_wraps_non_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());

        let path = store.save_factor_text("not json at all", None).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("unknown_factor_"));

        let value = DataStore::load_factor_json(&path).unwrap();
        assert_eq!(value, json!({"factor_text": "not json at all"}));
    }

    #[test]
    fn test_save_factor_text_uses_embedded_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = DataStore::new(dir.path());

        let path = store
            .save_factor_text(r#"{"factor_name": "reversal 5d"}"#, None)
            .unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("reversal_5d_"));
    }

    #[test]
    fn test_load_missing_factor_file() {
        let err = DataStore::load_factor_json("/no/such/factor.json").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
