//! Mock embedding provider using character n-gram hashing.

use crate::embeddings::provider::EmbeddingProvider;
use kbqa_core::AppResult;

pub const MOCK_MODEL: &str = "trigram-v1";

/// Mock provider for testing and offline use.
///
/// Hashes character bigrams and trigrams into a fixed number of buckets, so
/// texts sharing Chinese phrases land close together. Deterministic, not
/// semantic.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn generate_mock_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        for n in 2..=3 {
            for window in chars.windows(n) {
                let hash = window
                    .iter()
                    .fold(0u64, |acc, &c| acc.wrapping_mul(37).wrapping_add(c as u64));
                let dim_idx = (hash as usize) % self.dimensions;
                // Trigrams are more specific than bigrams
                embedding[dim_idx] += n as f32 - 1.0;
            }
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        MOCK_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| self.generate_mock_embedding(text))
            .collect())
    }
}
