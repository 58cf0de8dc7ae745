//! Over-fetching retrieval.

use crate::store::PassageStore;
use crate::types::Passage;
use kbqa_core::config::RetrievalConfig;
use kbqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Candidates fetched per requested passage.
const OVER_FETCH_FACTOR: usize = 3;

/// `clamp(3k, min, max)`.
pub fn over_fetch_count(k: usize, min: usize, max: usize) -> usize {
    k.saturating_mul(OVER_FETCH_FACTOR).clamp(min, max.max(min))
}

/// Queries the store for a wider pool than the answer needs so lexical
/// re-ranking has something to choose from.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn PassageStore>,
    min_over_fetch: usize,
    max_over_fetch: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn PassageStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            min_over_fetch: config.min_over_fetch,
            max_over_fetch: config.max_over_fetch,
        }
    }

    /// Fetch candidates for a final answer of `k` passages.
    ///
    /// Any store error fails the query as `AppError::Retrieval`. Candidates
    /// are renumbered so `original_rank` is their position in this list.
    pub async fn retrieve(&self, question: &str, k: usize) -> AppResult<Vec<Passage>> {
        let fetch = over_fetch_count(k, self.min_over_fetch, self.max_over_fetch);
        tracing::debug!("Over-fetching {} candidates for k={}", fetch, k);

        let passages = self.store.search(question, fetch).await.map_err(|e| match e {
            AppError::Retrieval(_) => e,
            other => AppError::Retrieval(other.to_string()),
        })?;

        Ok(passages
            .into_iter()
            .enumerate()
            .map(|(rank, passage)| passage.with_rank(rank))
            .collect())
    }
}
