use chrono::Local;
use factor_core::{ReportMetadata, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
use regex::Regex;
use std::sync::LazyLock;

/// Date and author labels are only searched for in the head of the report
const HEADER_SCAN_CHARS: usize = 1000;

static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+?)\n").expect("static regex"));

// 2024-03-15, 2024/3/15, 2024年3月15日, 2024.03.15
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}[年/-]\d{1,2}[月/-]\d{1,2}日?|\d{4}\.\d{1,2}\.\d{1,2})")
        .expect("static regex")
});

static AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:作者|研究员)[：:]\s*(.+?)(?:\n|$)").expect("static regex"));

/// Extract title, date and author from report text.
///
/// Every field falls back to a placeholder (or `None` for the date) when the
/// heuristics find nothing.
pub fn extract_metadata(content: &str) -> ReportMetadata {
    let title = TITLE
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let head = leading_chars(content, HEADER_SCAN_CHARS);

    let date = DATE.captures(head).map(|c| c[1].to_string());

    let author = AUTHOR
        .captures(head)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let metadata = ReportMetadata {
        title,
        date,
        author,
        processed_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    tracing::debug!("Extracted report metadata: {:?}", metadata);

    metadata
}

/// First `n` characters of `text` (not bytes)
fn leading_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
