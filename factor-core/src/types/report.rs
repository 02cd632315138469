use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "未知标题";
pub const UNKNOWN_AUTHOR: &str = "未知作者";

/// Best-effort metadata pulled from the head of a research report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    pub date: Option<String>,
    pub author: String,
    /// Local time of processing, `%Y-%m-%d %H:%M:%S`
    pub processed_time: String,
}

/// Cleaned report text together with its metadata, as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedReport {
    pub metadata: ReportMetadata,
    pub content: String,
}
