//! LLM provider factory.
//!
//! Maps a provider name plus resolved endpoint and secret onto a concrete
//! `LlmClient`.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiCompatClient};
use crate::types::ProviderType;
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai", "dashscope", "moonshot")
/// * `endpoint` - Optional custom API root
/// * `api_key` - API key for hosted providers
///
/// # Errors
/// Returns a message if the provider is unknown or a required key is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn LlmClient>, String> {
    let kind = ProviderType::parse(provider).ok_or_else(|| {
        format!(
            "Unknown provider: {}. Supported: ollama, openai, dashscope, moonshot",
            provider
        )
    })?;
    let base_url = endpoint.unwrap_or_else(|| kind.default_endpoint());

    match kind {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url))),
        hosted => {
            let key = api_key
                .filter(|k| !k.is_empty())
                .ok_or_else(|| format!("{} provider requires API key", hosted.as_str()))?;
            Ok(Arc::new(OpenAiCompatClient::new(
                hosted.as_str(),
                base_url,
                key,
            )))
        }
    }
}
