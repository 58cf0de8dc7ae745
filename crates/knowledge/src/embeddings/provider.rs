//! Embedding provider trait and factory.

use kbqa_core::config::{AppConfig, ProviderConfig};
use kbqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Default Ollama embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Dimensions of the offline mock embedder.
pub const MOCK_DIMENSIONS: usize = 384;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Embed passages in one call. Output order matches input order.
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a question.
    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_documents(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Knowledge("No embedding returned".to_string()))
    }
}

/// Which embedder to build and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
}

impl EmbeddingSettings {
    /// Read `llm.activeEmbeddingProvider` and its provider block.
    ///
    /// Without an `llm` section the offline mock embedder is used.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let Some(llm) = config.llm.as_ref() else {
            return Self::mock();
        };

        let provider = llm.active_embedding_provider.to_lowercase();
        match config.get_provider_config(&provider) {
            Some(ProviderConfig::Ollama {
                endpoint,
                embedding_model,
                ..
            }) => Self {
                provider,
                model: embedding_model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                endpoint: Some(endpoint),
            },
            Some(other) => Self {
                provider,
                model: other.model().to_string(),
                endpoint: other.endpoint().map(str::to_string),
            },
            None if provider == "mock" => Self::mock(),
            None => Self {
                provider,
                model: DEFAULT_EMBEDDING_MODEL.to_string(),
                endpoint: None,
            },
        }
    }

    pub fn mock() -> Self {
        Self {
            provider: "mock".to_string(),
            model: super::providers::mock::MOCK_MODEL.to_string(),
            endpoint: None,
        }
    }
}

/// Create an embedding provider from settings.
///
/// Remote providers are probed once, so an unreachable service fails here
/// rather than on the first question.
pub async fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "mock" => Ok(Arc::new(super::providers::MockProvider::new(MOCK_DIMENSIONS))),

        "ollama" => {
            let provider = super::providers::OllamaProvider::new(
                settings.endpoint.as_deref(),
                &settings.model,
            )
            .await?;
            Ok(Arc::new(provider))
        }

        other => Err(AppError::Knowledge(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, ollama",
            other
        ))),
    }
}
