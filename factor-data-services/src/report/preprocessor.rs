use regex::Regex;
use std::sync::LazyLock;

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("static regex"));

// "第3页 共20页" style page headers/footers
static PAGE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\d+页\s+共\d+页").expect("static regex"));

// Anything that is not a word char, whitespace or common CJK/ASCII punctuation
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\w\s\.,;:!?，。；：！？《》【】\(\)\[\]\{\}]").expect("static regex")
});

/// Strip layout boilerplate from raw report text before it is sent to a model
pub fn preprocess_report(content: &str) -> String {
    let content = BLANK_LINES.replace_all(content, "\n\n");
    let content = PAGE_HEADER.replace_all(&content, "");
    let content = NOISE.replace_all(&content, "");

    content.into_owned()
}
