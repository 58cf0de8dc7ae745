//! Ask command handler.
//!
//! Runs the answering pipeline over a JSONL corpus and prints the cited
//! answer with its sources.

use clap::Args;
use kbqa_core::{config::AppConfig, AppError, AppResult};
use kbqa_knowledge::embeddings::EmbeddingSettings;
use kbqa_knowledge::{
    create_provider, ClassificationService, ClassificationSettings, EngineSettings,
    InMemoryPassageStore, LocalFileStore, QueryEngine, QueryResponse, SourceType,
};
use kbqa_llm::create_client;
use kbqa_prompt::load_answer_prompt;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Answer a question from a corpus
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// JSONL corpus, one `{"text", "source", "fileName"}` record per line
    #[arg(long)]
    pub corpus: PathBuf,

    /// Passages to answer from (at most 10)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        // 1. Load and embed the corpus
        let embedder = create_provider(&EmbeddingSettings::from_app_config(config)).await?;
        let store = InMemoryPassageStore::from_jsonl(&self.corpus, embedder).await?;
        if store.is_empty() {
            tracing::warn!("Corpus {:?} has no passages", self.corpus);
        }

        // 2. Generator client
        let endpoint = config
            .get_provider_config(&config.provider)
            .and_then(|pc| pc.endpoint().map(str::to_string));
        let api_key = config.resolve_api_key(&config.provider);
        let generator = create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())
            .map_err(AppError::Config)?;

        // 3. Classification pool over the stored files
        let files = Arc::new(LocalFileStore::new(config.files_dir()));
        let classifier = Arc::new(ClassificationService::start(
            ClassificationSettings::from_config(&config.classification),
            files,
        ));

        let prompt = load_answer_prompt(&config.workspace)?;
        let engine = QueryEngine::new(
            Arc::new(store),
            generator,
            classifier.clone(),
            prompt,
            EngineSettings::from_config(config),
        );

        let result = engine.query(&self.question, self.top_k).await;

        tracing::debug!("Classification stats: {:?}", classifier.stats());
        classifier.shutdown().await;

        let response = result?;
        if self.json {
            let json = serde_json::to_string_pretty(&response)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            print!("{}", render_text(&response));
        }

        Ok(())
    }
}

/// Plain-text rendering: the answer, then one line per source document.
fn render_text(response: &QueryResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", response.answer);

    if response.document_groups.is_empty() {
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Sources:");
    for group in &response.document_groups {
        let indices: Vec<String> = group.chunks.iter().map(|c| c.index.to_string()).collect();
        let kind = match group.source_type {
            SourceType::Url => " [url]",
            SourceType::File => "",
        };
        let restricted = if group.has_restricted_form {
            " (restricted, not downloadable)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  [{}] {}{}{}",
            indices.join(","),
            group.title,
            kind,
            restricted
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbqa_knowledge::{DocumentGroup, PassageResult};

    fn group(title: &str, indices: &[usize], restricted: bool) -> DocumentGroup {
        DocumentGroup {
            title: title.to_string(),
            source_path: None,
            source_type: SourceType::File,
            file_type: Some("pdf".to_string()),
            file_id: None,
            chunks: indices
                .iter()
                .map(|&index| PassageResult {
                    text: String::new(),
                    index,
                    source_path: None,
                    title: title.to_string(),
                    preview: String::new(),
                })
                .collect(),
            has_restricted_form: restricted,
        }
    }

    #[test]
    fn test_render_text_lists_sources() {
        let response = QueryResponse {
            answer: "培训要求共三条①③。".to_string(),
            passages: Vec::new(),
            document_groups: vec![group("方案.pdf", &[1], true), group("通知.pdf", &[3], false)],
        };

        let text = render_text(&response);
        assert!(text.starts_with("培训要求共三条①③。\n"));
        assert!(text.contains("  [1] 方案.pdf (restricted, not downloadable)\n"));
        assert!(text.contains("  [3] 通知.pdf\n"));
    }

    #[test]
    fn test_render_text_without_sources() {
        let response = QueryResponse::empty("抱歉");
        assert_eq!(render_text(&response), "抱歉\n");
    }
}
