//! Restriction marker matching.

/// Phrasings that mark a document as not freely downloadable, with both the
/// full-width and the ASCII colon.
pub const DEFAULT_MARKERS: [&str; 6] = [
    "公开形式：不予公开",
    "公开形式：依申请公开",
    "公开形式：不公开",
    "公开形式:不予公开",
    "公开形式:依申请公开",
    "公开形式:不公开",
];

/// File types whose text is inspected. Everything else is never restricted.
pub const ELIGIBLE_FILE_TYPES: [&str; 4] = ["pdf", "doc", "docx", "txt"];

/// Longest UTF-8 encoding of one character.
pub const MAX_UTF8_BYTES: usize = 4;

pub fn is_eligible(file_type: Option<&str>) -> bool {
    file_type.is_some_and(|t| ELIGIBLE_FILE_TYPES.contains(&t.to_lowercase().as_str()))
}

/// A set of marker phrasings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    exact: Vec<String>,
    compact: Vec<String>,
}

impl MarkerSet {
    /// Empty phrasings are ignored.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let exact: Vec<String> = markers
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| !m.trim().is_empty())
            .collect();
        let compact = exact.iter().map(|m| compact(m)).collect();
        Self { exact, compact }
    }

    /// Exact substring match first, then a pass with spaces, tabs and line
    /// breaks removed from both sides.
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        if self.exact.iter().any(|m| text.contains(m.as_str())) {
            return true;
        }
        let normalized = compact(text);
        self.compact.iter().any(|m| normalized.contains(m.as_str()))
    }

    pub fn phrasings(&self) -> &[String] {
        &self.exact
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS)
    }
}

fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, ' ' | '\n' | '\r' | '\t'))
        .collect()
}

/// The last `n` characters of `text`.
pub fn last_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

/// Decode the tail of a file read from an arbitrary byte offset.
///
/// Continuation bytes of a character cut by the offset are dropped before
/// decoding, then the last `n` characters are kept.
pub fn decode_tail(bytes: &[u8], n: usize) -> String {
    let start = bytes
        .iter()
        .position(|b| b & 0xC0 != 0x80)
        .unwrap_or(bytes.len());
    let text = String::from_utf8_lossy(&bytes[start..]);
    last_chars(&text, n).to_string()
}
