use chrono::NaiveDate;
use factor_core::PerformanceReport;
use std::sync::Arc;

use super::performance::calculate_performance;
use super::runner::{BacktestError, BacktestResult, BacktestRunner};

/// Simulation period and starting capital handed to strategy code
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
}

impl Default for BacktestWindow {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or(NaiveDate::MAX),
            initial_capital: 1_000_000.0,
        }
    }
}

/// Boundary to the external backtest engine.
///
/// Runner failures never cross this boundary as errors from
/// [`run_backtest`](Self::run_backtest): they are logged and reported as "no
/// result" so the caller decides whether the whole run failed.
pub struct BacktestEngine {
    window: BacktestWindow,
    runner: Arc<dyn BacktestRunner>,
}

impl BacktestEngine {
    pub fn new(window: BacktestWindow, runner: Arc<dyn BacktestRunner>) -> Self {
        tracing::info!(
            "Initializing backtest engine: {} .. {}, capital={}",
            window.start_date,
            window.end_date,
            window.initial_capital
        );

        Self { window, runner }
    }

    pub fn window(&self) -> &BacktestWindow {
        &self.window
    }

    /// Run strategy code and expose the failure reason (used to build
    /// refinement feedback)
    pub async fn try_run(&self, code: &str) -> Result<BacktestResult, BacktestError> {
        self.runner.run(code, &self.window).await
    }

    /// Run strategy code; `None` when execution failed
    pub async fn run_backtest(&self, code: &str) -> Option<BacktestResult> {
        Self::settle(self.try_run(code).await)
    }

    /// Log the outcome of a run and keep only a successful result
    pub fn settle(outcome: Result<BacktestResult, BacktestError>) -> Option<BacktestResult> {
        match outcome {
            Ok(result) => {
                tracing::info!(
                    "Backtest finished with {} daily returns",
                    result.daily_returns.len()
                );
                Some(result)
            }
            Err(e) => {
                tracing::error!("Backtest execution failed: {}", e);
                None
            }
        }
    }

    /// Performance statistics of a run; `None` when it produced no returns
    pub fn calculate_performance(&self, result: &BacktestResult) -> Option<PerformanceReport> {
        calculate_performance(&result.daily_returns, self.window.start_date)
    }
}
