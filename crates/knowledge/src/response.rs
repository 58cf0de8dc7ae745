//! Final response assembly.

use crate::attribution::preview;
use crate::types::{DocumentGroup, PassageResult, QueryResponse};
use kbqa_core::config::ResponseConfig;

/// Size bounds applied to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseLimits {
    pub max_groups: usize,
    pub max_chunks_per_group: usize,
    pub max_chunk_chars: usize,
}

impl ResponseLimits {
    pub fn from_config(config: &ResponseConfig) -> Self {
        Self {
            max_groups: config.max_groups,
            max_chunks_per_group: config.max_chunks_per_group,
            max_chunk_chars: config.max_chunk_chars,
        }
    }
}

impl Default for ResponseLimits {
    fn default() -> Self {
        Self::from_config(&ResponseConfig::default())
    }
}

/// Order and bound the cited passages and groups.
///
/// Passages and each group's chunks are sorted by citation index; groups
/// are ordered by their earliest cited passage. Group count, chunks per
/// group and chunk length are capped.
pub fn assemble(
    answer: String,
    mut passages: Vec<PassageResult>,
    mut groups: Vec<DocumentGroup>,
    limits: &ResponseLimits,
) -> QueryResponse {
    passages.sort_by_key(|p| p.index);
    for passage in &mut passages {
        clip(passage, limits.max_chunk_chars);
    }

    for group in &mut groups {
        group.chunks.sort_by_key(|c| c.index);
        group.chunks.truncate(limits.max_chunks_per_group);
        for chunk in &mut group.chunks {
            clip(chunk, limits.max_chunk_chars);
        }
    }

    groups.sort_by(|a, b| {
        a.first_index()
            .cmp(&b.first_index())
            .then_with(|| a.title.cmp(&b.title))
    });
    if groups.len() > limits.max_groups {
        tracing::debug!(
            "Response capped at {} of {} document groups",
            limits.max_groups,
            groups.len()
        );
        groups.truncate(limits.max_groups);
    }

    QueryResponse {
        answer,
        passages,
        document_groups: groups,
    }
}

fn clip(result: &mut PassageResult, max_chars: usize) {
    if result.text.chars().count() > max_chars {
        result.text = preview(&result.text, max_chars);
    }
}
