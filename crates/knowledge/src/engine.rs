//! Question answering over the passage store.

use crate::attribution::{group_cited, strip_uuid_prefix};
use crate::citation::{extract_used_indices, used};
use crate::classification::ClassificationService;
use crate::filter::filter_relevant;
use crate::rerank::rerank;
use crate::response::{assemble, ResponseLimits};
use crate::retriever::Retriever;
use crate::store::PassageStore;
use crate::types::{Passage, QueryResponse};
use kbqa_core::config::{AppConfig, RetrievalConfig};
use kbqa_core::{AppError, AppResult};
use kbqa_llm::{complete_with_deadline, LlmClient, LlmRequest};
use kbqa_prompt::{build_answer_prompt, PromptDefinition, PromptPassage, CITATION_MARKERS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Answer returned when no passage is left to answer from.
pub const NO_RESULT_ANSWER: &str = "抱歉，我在知识库中没有找到相关信息。";

/// Passages sent to the generator at most; one per citation marker.
pub const MAX_PROMPT_PASSAGES: usize = CITATION_MARKERS.len();

/// Per-query policy.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Generator model identifier
    pub model: String,
    pub retrieval: RetrievalConfig,
    pub generation_timeout: Duration,
    pub request_timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub preview_chars: usize,
    pub limits: ResponseLimits,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            retrieval: config.retrieval.clone(),
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            request_timeout: Duration::from_secs(config.generation.request_timeout_secs),
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
            preview_chars: config.response.preview_chars,
            limits: ResponseLimits::from_config(&config.response),
        }
    }
}

/// The answering pipeline.
///
/// One engine serves any number of concurrent queries; the classification
/// service it holds is shared with every other engine in the process.
pub struct QueryEngine {
    retriever: Retriever,
    generator: Arc<dyn LlmClient>,
    classifier: Arc<ClassificationService>,
    prompt: PromptDefinition,
    settings: EngineSettings,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn PassageStore>,
        generator: Arc<dyn LlmClient>,
        classifier: Arc<ClassificationService>,
        prompt: PromptDefinition,
        settings: EngineSettings,
    ) -> Self {
        Self {
            retriever: Retriever::new(store, &settings.retrieval),
            generator,
            classifier,
            prompt,
            settings,
        }
    }

    pub fn classifier(&self) -> &Arc<ClassificationService> {
        &self.classifier
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Answer `question` from at most `top_k` passages.
    ///
    /// `top_k` defaults to `retrieval.topK` and is clamped to the citation
    /// alphabet. The whole query runs under `requestTimeoutSecs`; the
    /// generator call gets the shorter of its own deadline and what is left.
    ///
    /// # Errors
    /// - `AppError::Retrieval` when the store fails
    /// - `AppError::GenerationTimeout` / `AppError::Generation` from the generator
    /// - `AppError::RequestTimeout` when the overall deadline expires
    #[instrument(skip(self, question), fields(question_len = question.chars().count()))]
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> AppResult<QueryResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Knowledge("Question is empty".to_string()));
        }

        let requested = top_k.unwrap_or(self.settings.retrieval.top_k);
        let k = requested.clamp(1, MAX_PROMPT_PASSAGES);
        if k != requested {
            debug!("top_k {} clamped to {}", requested, k);
        }

        let started = Instant::now();
        let deadline = started + self.settings.request_timeout;

        let response = tokio::time::timeout_at(deadline, self.run(question, k, deadline))
            .await
            .map_err(|_| AppError::RequestTimeout {
                secs: self.settings.request_timeout.as_secs(),
            })??;

        info!(
            "Answered with {} cited passages in {} groups ({:?})",
            response.passages.len(),
            response.document_groups.len(),
            started.elapsed()
        );
        Ok(response)
    }

    async fn run(&self, question: &str, k: usize, deadline: Instant) -> AppResult<QueryResponse> {
        let candidates = self.retriever.retrieve(question, k).await?;
        let candidate_count = candidates.len();

        let ranked = rerank(question, candidates, k);
        let selected = filter_relevant(question, ranked);
        debug!(
            "{} candidates, {} passages selected",
            candidate_count,
            selected.len()
        );

        if selected.is_empty() {
            info!("No relevant passages found");
            return Ok(QueryResponse::empty(NO_RESULT_ANSWER));
        }

        // `selected` is frozen from here on: citation N is selected[N - 1]
        let answer = self.generate(question, &selected, deadline).await?;

        let used_indices = extract_used_indices(&answer, selected.len());
        debug!("Answer cites passages {:?}", used(&used_indices));

        let grouped =
            group_cited(&selected, &used_indices, deadline, self.settings.preview_chars).await;
        let mut groups = grouped.groups;
        self.classifier.classify_groups(&mut groups, deadline).await;

        Ok(assemble(
            answer,
            grouped.results,
            groups,
            &self.settings.limits,
        ))
    }

    async fn generate(
        &self,
        question: &str,
        passages: &[Passage],
        deadline: Instant,
    ) -> AppResult<String> {
        let prompt_passages: Vec<PromptPassage> = passages
            .iter()
            .map(|p| PromptPassage::new(p.text.clone(), source_label(p)))
            .collect();
        let built = build_answer_prompt(&self.prompt, question, &prompt_passages)?;

        let mut request = LlmRequest::new(built.user, self.settings.model.clone());
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = self.settings.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = self.settings.generation_timeout.min(remaining);

        let response = complete_with_deadline(self.generator.as_ref(), &request, budget).await?;
        debug!(
            "Generated {} chars with {} ({} tokens)",
            response.content.chars().count(),
            response.model,
            response.usage.total_tokens
        );
        Ok(response.content)
    }
}

/// Source shown next to a passage in the prompt.
fn source_label(passage: &Passage) -> Option<String> {
    passage
        .file_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(|n| strip_uuid_prefix(n).to_string())
        .or_else(|| passage.source_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = AppConfig::default();
        config.generation.timeout_secs = 60;
        config.response.max_groups = 5;

        let settings = EngineSettings::from_config(&config);
        assert_eq!(settings.generation_timeout, Duration::from_secs(60));
        assert_eq!(settings.request_timeout, Duration::from_secs(150));
        assert_eq!(settings.limits.max_groups, 5);
        assert_eq!(settings.model, config.model);
    }

    #[test]
    fn test_source_label() {
        let passage = Passage::new("x")
            .with_source("/f/a")
            .with_file_name("0f8fad5b-d9cb-469f-a165-70867728950e_办法.pdf");
        assert_eq!(source_label(&passage).as_deref(), Some("办法.pdf"));

        let passage = Passage::new("x").with_source("https://example.com/a");
        assert_eq!(
            source_label(&passage).as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(source_label(&Passage::new("x")), None);
    }

    #[test]
    fn test_prompt_alphabet_bound() {
        assert_eq!(MAX_PROMPT_PASSAGES, 10);
    }
}
