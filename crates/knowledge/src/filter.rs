//! Relevance gate applied after re-ranking.

use crate::keywords::{core_keywords, normalize, strip_whitespace};
use crate::types::Passage;

/// Passages kept when no passage contains a core keyword.
pub const FALLBACK_PASSAGES: usize = 3;

/// Keep only passages containing at least one core keyword of the question.
///
/// Questions without core keywords pass everything through. If nothing
/// survives, the first [`FALLBACK_PASSAGES`] inputs are returned.
pub fn filter_relevant(question: &str, passages: Vec<Passage>) -> Vec<Passage> {
    let keywords = core_keywords(question);
    if keywords.is_empty() {
        return passages;
    }

    let (kept, dropped): (Vec<_>, Vec<_>) = passages
        .iter()
        .cloned()
        .partition(|p| contains_any(&p.text, &keywords));

    if kept.is_empty() {
        tracing::debug!(
            "No passage contains {:?}, keeping the first {}",
            keywords,
            FALLBACK_PASSAGES
        );
        return passages.into_iter().take(FALLBACK_PASSAGES).collect();
    }

    if !dropped.is_empty() {
        tracing::debug!("Relevance filter dropped {} passages", dropped.len());
    }
    kept
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    let content = normalize(text);
    let compact = strip_whitespace(&content);
    keywords
        .iter()
        .any(|k| content.contains(k.as_str()) || compact.contains(k.as_str()))
}
