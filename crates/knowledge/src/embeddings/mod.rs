//! Embedders used by the passage store.
//!
//! Passages and questions are embedded through the same provider so their
//! vectors are comparable.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider, EmbeddingSettings};
pub use providers::{MockProvider, OllamaProvider};
