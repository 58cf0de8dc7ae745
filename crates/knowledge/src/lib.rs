//! Post-retrieval answering pipeline.
//!
//! Turns a question into a cited answer over a private corpus:
//! over-fetch from the passage store, lexical re-ranking, a relevance gate,
//! a citation-enforcing prompt, citation extraction, concurrent attribution
//! grouping, and a cached restriction-marker check per source document.
//! `QueryEngine` wires the stages together.

pub mod attribution;
pub mod citation;
pub mod classification;
pub mod embeddings;
pub mod engine;
pub mod filter;
pub mod keywords;
pub mod rerank;
pub mod response;
pub mod retriever;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use classification::{
    ClassificationError, ClassificationService, ClassificationSettings, FileStore, LocalFileStore,
};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use engine::{EngineSettings, QueryEngine, NO_RESULT_ANSWER};
pub use store::{InMemoryPassageStore, PassageStore};
pub use types::{DocumentGroup, Passage, PassageResult, QueryResponse, ScoredPassage, SourceType};
