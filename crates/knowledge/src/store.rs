//! Passage stores.
//!
//! The pipeline only needs `search(query, k)`. [`InMemoryPassageStore`]
//! embeds a JSONL corpus at load time and ranks by cosine similarity; a
//! vector database client implements the same trait.

use crate::embeddings::EmbeddingProvider;
use crate::types::Passage;
use kbqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Nearest-neighbour search over stored passages.
#[async_trait::async_trait]
pub trait PassageStore: Send + Sync {
    /// Up to `k` passages, best first.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Passage>>;
}

/// One line of a JSONL corpus file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusRecord {
    pub text: String,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug)]
struct StoredPassage {
    passage: Passage,
    embedding: Vec<f32>,
}

/// Passage store held in memory.
#[derive(Debug)]
pub struct InMemoryPassageStore {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: Vec<StoredPassage>,
}

impl InMemoryPassageStore {
    /// Load and embed a JSONL corpus.
    ///
    /// Blank lines are skipped. A malformed line fails the load with its
    /// line number.
    pub async fn from_jsonl(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Knowledge(format!("Failed to read corpus {:?}: {}", path, e))
        })?;

        let mut records = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CorpusRecord = serde_json::from_str(line).map_err(|e| {
                AppError::Knowledge(format!(
                    "Invalid corpus record at {:?}:{}: {}",
                    path,
                    line_no + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        tracing::info!("Loaded {} passages from {:?}", records.len(), path);
        Self::from_records(records, embedder).await
    }

    /// Embed records and build the store.
    pub async fn from_records(
        records: Vec<CorpusRecord>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;

        if embeddings.len() != records.len() {
            return Err(AppError::Knowledge(format!(
                "Embedder returned {} vectors for {} passages",
                embeddings.len(),
                records.len()
            )));
        }

        let entries = records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| StoredPassage {
                passage: Passage {
                    text: record.text,
                    source_path: record.source,
                    file_name: record.file_name,
                    original_rank: 0,
                },
                embedding,
            })
            .collect();

        tracing::debug!(
            "Embedded corpus with {} ({})",
            embedder.provider_name(),
            embedder.model_name()
        );

        Ok(Self { embedder, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl PassageStore for InMemoryPassageStore {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<Passage>> {
        let query_embedding = self.embedder.embed_query(query).await?;

        let mut scored: Vec<(f32, &StoredPassage)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_embedding, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(rank, (_, entry))| entry.passage.clone().with_rank(rank))
            .collect())
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
