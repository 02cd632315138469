pub mod backtest;
pub mod report;
pub mod storage;

// Re-export commonly used items
pub use backtest::{
    calculate_performance, BacktestEngine, BacktestError, BacktestResult, BacktestRunner,
    BacktestWindow, ProcessBacktestRunner, ProcessRunnerConfig,
};
pub use report::{extract_metadata, load_report, preprocess_report, ReportError};
pub use storage::{file_timestamp, safe_file_stem, DataStore};
