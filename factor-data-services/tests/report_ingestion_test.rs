/// Report ingestion tests
///
/// These tests cover:
/// - Loading a report from disk and cleaning it
/// - Metadata heuristics on a realistic report head
/// - Descriptive failures for missing and unsupported files
use factor_data_services::{extract_metadata, load_report, preprocess_report, ReportError};
use std::io::Write;

const REPORT: &str = "2024年量化动量因子研究\n作者：张三\n发布日期：2024-03-15\n\n\n\n摘要：本文构建了20日动量因子。\n第1页 共12页\n";

fn write_report(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_metadata_from_report_head() {
    let metadata = extract_metadata(REPORT);

    assert_eq!(metadata.title, "2024年量化动量因子研究");
    assert_eq!(metadata.author, "张三");
    assert_eq!(metadata.date.as_deref(), Some("2024-03-15"));
    assert_eq!(metadata.processed_time.len(), "2024-03-15 10:00:00".len());
}

#[test]
fn test_load_then_preprocess() {
    let file = write_report(".txt", REPORT);

    let raw = load_report(file.path()).unwrap();
    assert_eq!(raw, REPORT);

    let cleaned = preprocess_report(&raw);
    assert!(!cleaned.contains("\n\n\n"));
    assert!(!cleaned.contains("第1页"));
    assert!(cleaned.contains("摘要：本文构建了20日动量因子。"));
    // Dashes count as noise once the text is cleaned
    assert!(cleaned.contains("20240315"));
}

#[test]
fn test_metadata_survives_preprocessing() {
    let metadata = extract_metadata(&preprocess_report(REPORT));
    assert_eq!(metadata.title, "2024年量化动量因子研究");
    assert_eq!(metadata.author, "张三");
}

#[test]
fn test_missing_report_is_fatal() {
    let err = load_report("/tmp/definitely-missing-report.md").unwrap_err();
    assert!(matches!(err, ReportError::NotFound(_)));
}

#[test]
fn test_unknown_extension_is_fatal() {
    let file = write_report(".pptx", "slides");
    let err = load_report(file.path()).unwrap_err();
    assert!(err.to_string().contains(".pptx"));
}

#[cfg(not(feature = "docx"))]
#[test]
fn test_docx_without_parser_is_actionable() {
    let file = write_report(".docx", "PK");
    let err = load_report(file.path()).unwrap_err();
    assert!(matches!(err, ReportError::MissingParser { .. }));
    assert!(err.to_string().contains("--features docx"));
}
