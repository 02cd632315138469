//! Best-effort repair of almost-JSON model output.
//!
//! Models often wrap JSON in markdown fences, drop the outer braces, or put
//! unescaped double quotes inside string values. These helpers fix those
//! three cases and nothing else; the result still goes through a strict
//! parser.

/// Remove a leading ```` ```json ```` (or bare ```` ``` ````) fence and a
/// trailing ```` ``` ````, then trim.
pub fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    text = text.trim();

    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }

    text
}

/// Repair common JSON defects.
///
/// 1. Wrap the text in `{`/`}` when either brace is missing at the ends.
/// 2. For each string value (a `"` right after `:`), escape inner `"` up to
///    the first quote that is followed by `,`, `}` or `]`.
///
/// Already-valid JSON whose string values contain no such quote sequences
/// comes back unchanged.
pub fn repair_json(text: &str) -> String {
    let text = text.trim();

    let mut wrapped = String::with_capacity(text.len() + 2);
    if !text.starts_with('{') {
        wrapped.push('{');
    }
    wrapped.push_str(text);
    if !text.ends_with('}') {
        wrapped.push('}');
    }

    escape_inner_quotes(&wrapped)
}

fn escape_inner_quotes(text: &str) -> String {
    // Every delimiter we look for is ASCII, so byte offsets always land on
    // char boundaries.
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 16);
    let mut cursor = 0;

    while let Some(value_start) = find_value_start(bytes, cursor) {
        out.push_str(&text[cursor..value_start]);

        let Some(value_end) = find_value_end(bytes, value_start) else {
            out.push_str(&text[value_start..]);
            return out;
        };

        out.push_str(&escape_unescaped_quotes(&text[value_start..value_end]));
        out.push('"');
        cursor = value_end + 1;
    }

    out.push_str(&text[cursor..]);
    out
}

/// Index just past the opening quote of the next `: "` at or after `from`
fn find_value_start(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b':' {
            let j = skip_whitespace(bytes, i + 1);
            if bytes.get(j) == Some(&b'"') {
                return Some(j + 1);
            }
        }
        i += 1;
    }
    None
}

/// Index of the first `"` at or after `from` followed by optional whitespace
/// and one of `,`, `}`, `]`
fn find_value_end(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&i| {
        bytes[i] == b'"'
            && matches!(
                bytes.get(skip_whitespace(bytes, i + 1)),
                Some(b',') | Some(b'}') | Some(b']')
            )
    })
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn escape_unescaped_quotes(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len());
    let mut previous = None;

    for c in content.chars() {
        if c == '"' && previous != Some('\\') {
            escaped.push('\\');
        }
        escaped.push(c);
        previous = Some(c);
    }

    escaped
}
