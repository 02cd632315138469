use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

use super::engine::BacktestWindow;

/// Exit status the harness uses when the module has no `run_strategy`
const MISSING_ENTRY_POINT_STATUS: i32 = 3;

/// Marker that prefixes the harness' result line on stdout
const RESULT_MARKER: &str = "__BACKTEST_RESULT__";

/// Python harness: import the strategy module, call `run_strategy` and print
/// its daily returns as one JSON line. Strategy code may print freely; only
/// the marked line is read back.
const PYTHON_HARNESS: &str = r#"
import importlib.util
import json
import sys

path, start_date, end_date, capital = sys.argv[1], sys.argv[2], sys.argv[3], float(sys.argv[4])
spec = importlib.util.spec_from_file_location("strategy_module", path)
module = importlib.util.module_from_spec(spec)
spec.loader.exec_module(module)
if not hasattr(module, "run_strategy"):
    sys.stderr.write("strategy module does not define run_strategy\n")
    sys.exit(3)
result = module.run_strategy(start_date=start_date, end_date=end_date, initial_capital=capital)
daily_returns = [float(r) for r in list(result.get("daily_returns", []))]
print("__BACKTEST_RESULT__" + json.dumps({"daily_returns": daily_returns}))
"#;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Failed to prepare strategy module: {0}")]
    Io(#[from] std::io::Error),

    #[error("Strategy code does not define run_strategy")]
    MissingEntryPoint,

    #[error("Backtest process failed ({status}): {stderr}")]
    Process { status: String, stderr: String },

    #[error("Backtest timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed backtest output: {0}")]
    Output(String),
}

/// Raw output of one strategy run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default)]
    pub daily_returns: Vec<f64>,
}

/// Executes generated strategy code and returns its daily returns
#[async_trait]
pub trait BacktestRunner: Send + Sync {
    async fn run(
        &self,
        code: &str,
        window: &BacktestWindow,
    ) -> Result<BacktestResult, BacktestError>;
}

/// Configuration for [`ProcessBacktestRunner`]
#[derive(Debug, Clone)]
pub struct ProcessRunnerConfig {
    /// Interpreter used to run generated strategy code
    pub interpreter: String,
    pub timeout_seconds: u64,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_seconds: 600,
        }
    }
}

/// Runs strategy code in a child interpreter process.
///
/// The code is written to a temporary module that is removed when the run
/// finishes, whatever the outcome.
pub struct ProcessBacktestRunner {
    config: ProcessRunnerConfig,
}

impl ProcessBacktestRunner {
    pub fn new(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessRunnerConfig {
        &self.config
    }
}

#[async_trait]
impl BacktestRunner for ProcessBacktestRunner {
    async fn run(
        &self,
        code: &str,
        window: &BacktestWindow,
    ) -> Result<BacktestResult, BacktestError> {
        let mut module = tempfile::Builder::new()
            .prefix("strategy_")
            .suffix(".py")
            .tempfile()?;
        module.write_all(code.as_bytes())?;
        module.flush()?;

        tracing::info!(
            "Running strategy {} with {} ({} .. {}, capital {})",
            module.path().display(),
            self.config.interpreter,
            window.start_date,
            window.end_date,
            window.initial_capital
        );

        let mut command = tokio::process::Command::new(&self.config.interpreter);
        command
            .arg("-c")
            .arg(PYTHON_HARNESS)
            .arg(module.path())
            .arg(window.start_date.to_string())
            .arg(window.end_date.to_string())
            .arg(window.initial_capital.to_string())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| BacktestError::Timeout(self.config.timeout_seconds))??;

        if output.status.code() == Some(MISSING_ENTRY_POINT_STATUS) {
            return Err(BacktestError::MissingEntryPoint);
        }

        if !output.status.success() {
            return Err(BacktestError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_harness_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Find the marked result line in harness stdout
fn parse_harness_output(stdout: &str) -> Result<BacktestResult, BacktestError> {
    let line = stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(RESULT_MARKER))
        .ok_or_else(|| BacktestError::Output("no result line in strategy output".to_string()))?;

    serde_json::from_str(line).map_err(|e| BacktestError::Output(e.to_string()))
}
