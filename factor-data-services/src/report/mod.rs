pub mod loader;
pub mod metadata;
pub mod preprocessor;

// Re-export commonly used items
pub use loader::{load_report, ReportError};
pub use metadata::extract_metadata;
pub use preprocessor::preprocess_report;
