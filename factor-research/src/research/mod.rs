/// Research workflow turning a report into factor logic and strategy code
pub mod processor;

pub use processor::{extract_code_block, ResearchProcessor};
