//! Data model shared by the pipeline stages.

use serde::{Deserialize, Serialize};

/// A retrieved passage. Immutable once the store hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub text: String,

    /// Stored path or URL the passage was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    /// Stored file name, usually `{fileID}_{originalName}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// 0-based position in the store's result list
    #[serde(default)]
    pub original_rank: usize,
}

impl Passage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_path: None,
            file_name: None,
            original_rank: 0,
        }
    }

    pub fn with_source(mut self, source_path: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.original_rank = rank;
        self
    }
}

/// A candidate passage with its lexical score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredPassage {
    pub passage: Passage,

    /// Lexical score minus `original_index`
    pub score: i64,

    /// Position in the candidate list before re-ranking
    pub original_index: usize,
}

impl ScoredPassage {
    /// Score before the rank tie-break was subtracted.
    pub fn raw_score(&self) -> i64 {
        self.score + self.original_index as i64
    }
}

/// A cited passage as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageResult {
    pub text: String,

    /// 1-based position among the passages sent to the generator
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    pub title: String,
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    File,
    Url,
}

/// All cited passages that came from one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentGroup {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    pub source_type: SourceType,

    /// Lowercased extension without the dot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    #[serde(rename = "fileId", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    pub chunks: Vec<PassageResult>,

    /// Whether the document carries a restriction marker and must not be
    /// offered for download
    pub has_restricted_form: bool,
}

impl DocumentGroup {
    /// Smallest citation index in the group.
    pub fn first_index(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.index)
            .min()
            .unwrap_or(usize::MAX)
    }
}

/// Result of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub answer: String,

    /// Cited passages sorted by index
    pub passages: Vec<PassageResult>,

    pub document_groups: Vec<DocumentGroup>,
}

impl QueryResponse {
    /// Answer with nothing cited.
    pub fn empty(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            passages: Vec::new(),
            document_groups: Vec::new(),
        }
    }
}
