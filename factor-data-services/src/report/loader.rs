use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported report file type: {0:?}")]
    UnsupportedType(String),

    #[error("{format} reports need an optional parser: {hint}")]
    MissingParser {
        format: &'static str,
        hint: &'static str,
    },

    #[error("Failed to read report {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} report: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Load the raw text of a research report.
///
/// Plain text and markdown are read directly. PDF and Word documents need the
/// `pdf` / `docx` cargo features; without them the call fails with
/// [`ReportError::MissingParser`] telling the operator how to enable them.
pub fn load_report(path: impl AsRef<Path>) -> Result<String, ReportError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ReportError::NotFound(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    tracing::debug!("Loading report {} (type: {:?})", path.display(), extension);

    let content = match extension.as_str() {
        "txt" | "md" => std::fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?,
        "pdf" => read_pdf(path)?,
        "docx" => read_docx(path)?,
        "doc" => {
            return Err(ReportError::MissingParser {
                format: "Word 97-2003 (.doc)",
                hint: "convert the file to .docx and rebuild with `--features docx`",
            })
        }
        "" => return Err(ReportError::UnsupportedType("(no extension)".to_string())),
        other => return Err(ReportError::UnsupportedType(format!(".{}", other))),
    };

    tracing::info!(
        "Loaded report {} ({} chars)",
        path.display(),
        content.chars().count()
    );

    Ok(content)
}

#[cfg(feature = "pdf")]
fn read_pdf(path: &Path) -> Result<String, ReportError> {
    pdf_extract::extract_text(path).map_err(|e| ReportError::Parse {
        format: "PDF",
        message: e.to_string(),
    })
}

#[cfg(not(feature = "pdf"))]
fn read_pdf(_path: &Path) -> Result<String, ReportError> {
    Err(ReportError::MissingParser {
        format: "PDF",
        hint: "rebuild with `--features pdf` to enable pdf-extract",
    })
}

#[cfg(feature = "docx")]
fn read_docx(path: &Path) -> Result<String, ReportError> {
    use std::io::Read;

    let parse_error = |e: zip::result::ZipError| ReportError::Parse {
        format: "Word",
        message: e.to_string(),
    };

    let file = std::fs::File::open(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(parse_error)?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(parse_error)?
        .read_to_string(&mut xml)
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(docx::paragraphs(&xml).join("\n"))
}

#[cfg(not(feature = "docx"))]
fn read_docx(_path: &Path) -> Result<String, ReportError> {
    Err(ReportError::MissingParser {
        format: "Word",
        hint: "rebuild with `--features docx` to enable the .docx reader",
    })
}

#[cfg(feature = "docx")]
mod docx {
    use regex::Regex;
    use std::sync::LazyLock;

    static TEXT_RUN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").expect("static regex"));

    /// Text of every `<w:p>` paragraph in a WordprocessingML body
    pub fn paragraphs(xml: &str) -> Vec<String> {
        xml.split("</w:p>")
            .filter(|chunk| chunk.contains("<w:p"))
            .map(|chunk| {
                TEXT_RUN
                    .captures_iter(chunk)
                    .map(|c| unescape(&c[1]))
                    .collect::<String>()
            })
            .collect()
    }

    fn unescape(text: &str) -> String {
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_text_and_markdown() {
        let txt = write_temp(".txt", "动量因子研究\n正文");
        assert_eq!(load_report(txt.path()).unwrap(), "动量因子研究\n正文");

        let md = write_temp(".MD", "# Title");
        assert_eq!(load_report(md.path()).unwrap(), "# Title");
    }

    #[test]
    fn test_missing_file() {
        let err = load_report("/path/that/does/not/exist.txt").unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
        assert!(err.to_string().contains("does/not/exist.txt"));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".xlsx", "");
        let err = load_report(file.path()).unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedType(ref ext) if ext == ".xlsx"));
    }

    #[test]
    fn test_legacy_doc_needs_conversion() {
        let file = write_temp(".doc", "");
        let err = load_report(file.path()).unwrap_err();
        assert!(matches!(err, ReportError::MissingParser { .. }));
        assert!(err.to_string().contains(".docx"));
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn test_pdf_without_parser() {
        let file = write_temp(".pdf", "%PDF-1.4");
        let err = load_report(file.path()).unwrap_err();
        assert!(matches!(err, ReportError::MissingParser { format: "PDF", .. }));
        assert!(err.to_string().contains("--features pdf"));
    }
}
