pub mod engine;
pub mod grouping;
pub mod performance;
pub mod runner;

// Re-export commonly used items
pub use engine::{BacktestEngine, BacktestWindow};
pub use grouping::{categorize, group_returns};
pub use performance::calculate_performance;
pub use runner::{
    BacktestError, BacktestResult, BacktestRunner, ProcessBacktestRunner, ProcessRunnerConfig,
};
