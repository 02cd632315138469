pub mod conversation;
pub mod factor_logic;
pub mod performance;
pub mod report;

// Re-export common types
pub use conversation::{ChatMessage, ChatRole, Conversation};
pub use factor_logic::FactorLogic;
pub use performance::PerformanceReport;
pub use report::{ProcessedReport, ReportMetadata, UNKNOWN_AUTHOR, UNKNOWN_TITLE};

/// Daily strategy return as a fraction (0.01 = +1%)
pub type DailyReturn = f64;

/// Timestamp format used for every persisted artifact name
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
