//! Ollama embedding provider.
//!
//! Calls `/api/embeddings` once per text. The endpoint has no batch form, so
//! passages are embedded with a small fixed concurrency. Failed requests are
//! retried with exponential backoff.

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use kbqa_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const EMBEDDING_ENDPOINT: &str = "/api/embeddings";

/// Maximum attempts per text
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 100;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Requests in flight while embedding a corpus
const CONCURRENT_REQUESTS: usize = 4;

/// Ollama embedding provider using the local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    /// Learned from the first successful response
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Connect to Ollama and probe the model's dimensions.
    ///
    /// `base_url` defaults to `OLLAMA_URL` or the local daemon.
    ///
    /// # Errors
    /// `AppError::Llm` if Ollama is unreachable or the model is not installed.
    pub async fn new(base_url: Option<&str>, model: &str) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Llm(format!("Failed to create HTTP client for Ollama: {}", e)))?;

        let base_url = base_url
            .map(str::to_string)
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut provider = Self {
            client,
            base_url,
            model: model.to_string(),
            dimensions: 0,
        };

        provider.dimensions = provider.probe_dimensions().await?;
        Ok(provider)
    }

    #[instrument(skip(self), fields(model = %self.model))]
    async fn probe_dimensions(&self) -> AppResult<usize> {
        debug!("Verifying Ollama connection at {}", self.base_url);

        match self.embed_with_retries("test connection").await {
            Ok(embedding) if !embedding.is_empty() => {
                debug!(
                    "Ollama model '{}' ready, {} dimensions",
                    self.model,
                    embedding.len()
                );
                Ok(embedding.len())
            }
            Ok(_) => Err(AppError::Llm(format!(
                "Ollama model '{}' returned an empty embedding",
                self.model
            ))),
            Err(e) => {
                warn!("Failed to connect to Ollama: {}", e);
                Err(AppError::Llm(format!(
                    "Ollama not available at {}. Ensure Ollama is running and model '{}' is installed. Run: ollama pull {}",
                    self.base_url, self.model, self.model
                )))
            }
        }
    }

    async fn embed_with_retries(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut attempt = 0;

        loop {
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(e);
                    }
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                    warn!(
                        "Embedding failed (attempt {}/{}), retrying in {}ms: {}",
                        attempt, MAX_RETRIES, backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(AppError::Llm(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))?;

        if self.dimensions != 0 && body.embedding.len() != self.dimensions {
            return Err(AppError::Llm(format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                body.embedding.len(),
                self.dimensions
            )));
        }

        Ok(body.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_documents(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        // `buffered` keeps input order
        let requests: Vec<_> = texts
            .iter()
            .map(|text| async move {
                if text.trim().is_empty() {
                    Ok(vec![0.0; self.dimensions])
                } else {
                    self.embed_with_retries(text).await
                }
            })
            .collect();
        stream::iter(requests)
        .buffered(CONCURRENT_REQUESTS)
        .try_collect()
        .await
    }

    async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Llm("Cannot embed empty text".to_string()));
        }
        self.embed_with_retries(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to check if Ollama is running
    async fn is_ollama_running() -> bool {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let url = format!("{}/api/tags", DEFAULT_OLLAMA_URL);
        client.get(&url).send().await.is_ok()
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_fast() {
        // Port 9 (discard) is never an Ollama daemon
        let result = OllamaProvider::new(Some("http://127.0.0.1:9"), "nomic-embed-text").await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("ollama pull nomic-embed-text"));
    }

    #[tokio::test]
    async fn test_embed_documents_keeps_order() {
        if std::env::var("OLLAMA_URL").is_err() && !is_ollama_running().await {
            println!("Skipping test: Ollama not running");
            return;
        }

        let provider = OllamaProvider::new(None, "nomic-embed-text").await.unwrap();
        let texts = vec!["培训要求".to_string(), String::new(), "预算".to_string()];
        let embeddings = provider.embed_documents(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        assert!(embeddings[1].iter().all(|&x| x == 0.0));
        assert_eq!(embeddings[0].len(), provider.dimensions());
    }
}
