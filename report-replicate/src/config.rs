use anyhow::{Context, Result};
use chrono::NaiveDate;
use factor_data_services::BacktestWindow;
use std::path::PathBuf;

/// Run configuration for one replication
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    /// Root of the artifact layout (`reports/processed`, `factors`, ...)
    pub data_dir: PathBuf,
    pub window: BacktestWindow,
    /// Model preset or identifier; `None` selects the configured default
    pub model: Option<String>,
    pub extract_only: bool,
    /// Refinement rounds allowed after a failed backtest
    pub max_refinements: u32,
    /// Interpreter for generated strategy code
    pub python: String,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            window: BacktestWindow::default(),
            model: None,
            extract_only: false,
            max_refinements: 0,
            python: "python3".to_string(),
        }
    }
}

impl ReplicateConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `BACKTEST_START_DATE`, `BACKTEST_END_DATE`,
    /// `DEFAULT_CAPITAL` and `DATA_PATH`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(date) = get("BACKTEST_START_DATE") {
            config.window.start_date = parse_date(&date).context("Invalid BACKTEST_START_DATE")?;
        }
        if let Some(date) = get("BACKTEST_END_DATE") {
            config.window.end_date = parse_date(&date).context("Invalid BACKTEST_END_DATE")?;
        }
        if let Some(capital) = get("DEFAULT_CAPITAL") {
            config.window.initial_capital = capital
                .trim()
                .parse()
                .with_context(|| format!("Invalid DEFAULT_CAPITAL: {}", capital))?;
        }
        if let Some(path) = get("DATA_PATH") {
            config.data_dir = PathBuf::from(path);
        }

        Ok(config)
    }

    pub fn set_start_date(&mut self, date: &str) -> Result<()> {
        self.window.start_date = parse_date(date).context("Invalid --start-date")?;
        Ok(())
    }

    pub fn set_end_date(&mut self, date: &str) -> Result<()> {
        self.window.end_date = parse_date(date).context("Invalid --end-date")?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.start_date > self.window.end_date {
            anyhow::bail!(
                "Backtest start date {} is after end date {}",
                self.window.start_date,
                self.window.end_date
            );
        }
        if !(self.window.initial_capital > 0.0) {
            anyhow::bail!("Initial capital must be positive, got {}", self.window.initial_capital);
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{}'", text))
}
