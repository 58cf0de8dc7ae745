//! End-to-end tests for the answering pipeline.

use crate::classification::{
    ClassificationError, ClassificationService, ClassificationSettings, FileStore, LocalFileStore,
};
use crate::engine::{EngineSettings, QueryEngine, NO_RESULT_ANSWER};
use crate::store::PassageStore;
use crate::types::Passage;
use kbqa_core::config::AppConfig;
use kbqa_core::{AppError, AppResult};
use kbqa_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use kbqa_prompt::default_answer_prompt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ID_A: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const ID_B: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
    const ID_C: &str = "16fd2706-8baf-433b-82eb-8c7fada847da";

    const QUESTION: &str = "培训要求有几条";

    #[derive(Default)]
    struct FakeStore {
        passages: Vec<Passage>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait::async_trait]
    impl PassageStore for FakeStore {
        async fn search(&self, _query: &str, k: usize) -> AppResult<Vec<Passage>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(AppError::Retrieval("vector index offline".to_string()));
            }
            Ok(self.passages.iter().take(k).cloned().collect())
        }
    }

    /// Generator that always answers with the same text.
    struct ScriptedGenerator {
        answer: String,
        delay: Option<Duration>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                delay: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedGenerator {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(LlmResponse {
                content: self.answer.clone(),
                model: request.model.clone(),
                usage: LlmUsage::new(100, 20),
            })
        }
    }

    /// In-memory file store counting every read.
    #[derive(Debug, Default)]
    struct CountingFileStore {
        files: HashMap<String, String>,
        reads: AtomicUsize,
        delay: Option<Duration>,
    }

    impl CountingFileStore {
        fn with_file(mut self, file_id: &str, text: &str) -> Self {
            self.files.insert(file_id.to_string(), text.to_string());
            self
        }

        fn text(&self, path: &Path) -> Result<&String, ClassificationError> {
            let key = path.to_string_lossy().to_string();
            self.files
                .get(&key)
                .ok_or(ClassificationError::NotFound(key))
        }
    }

    impl FileStore for CountingFileStore {
        fn locate(&self, file_id: &str, _title: &str) -> Result<PathBuf, ClassificationError> {
            if self.files.contains_key(file_id) {
                Ok(PathBuf::from(file_id))
            } else {
                Err(ClassificationError::NotFound(file_id.to_string()))
            }
        }

        fn read_last_bytes(&self, path: &Path, n: usize) -> Result<Vec<u8>, ClassificationError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let bytes = self.text(path)?.as_bytes();
            Ok(bytes[bytes.len().saturating_sub(n)..].to_vec())
        }

        fn load_document(&self, path: &Path) -> Result<Vec<String>, ClassificationError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.text(path)?.clone()])
        }
    }

    fn settings() -> EngineSettings {
        let mut settings = EngineSettings::from_config(&AppConfig::default());
        settings.generation_timeout = Duration::from_secs(5);
        settings.request_timeout = Duration::from_secs(10);
        settings
    }

    fn classification() -> ClassificationSettings {
        ClassificationSettings {
            workers: 2,
            queue_capacity: 16,
            wait_ceiling: Duration::from_secs(2),
            read_deadline: Duration::from_secs(2),
            ..ClassificationSettings::default()
        }
    }

    fn passage(file_id: &str, name: &str, text: &str) -> Passage {
        let file_name = format!("{}_{}", file_id, name);
        Passage::new(text)
            .with_source(format!("/srv/files/{}", file_name))
            .with_file_name(file_name)
    }

    fn three_passages() -> Vec<Passage> {
        vec![
            passage(ID_A, "培训方案.txt", "培训要求共三条：一是按时参训。"),
            passage(ID_B, "考核办法.txt", "培训要求包括考核合格。"),
            passage(ID_C, "补充通知.txt", "补充通知明确培训要求不少于3天。"),
        ]
    }

    fn engine(
        store: FakeStore,
        generator: Arc<ScriptedGenerator>,
        classifier: Arc<ClassificationService>,
        settings: EngineSettings,
    ) -> QueryEngine {
        QueryEngine::new(
            Arc::new(store),
            generator,
            classifier,
            default_answer_prompt(),
            settings,
        )
    }

    #[tokio::test]
    async fn test_cited_passages_grouped_by_document() {
        let files = Arc::new(
            CountingFileStore::default()
                .with_file(ID_A, "正文\n公开形式：不予公开")
                .with_file(ID_B, "正文")
                .with_file(ID_C, "正文\n公开形式：主动公开"),
        );
        let classifier = Arc::new(ClassificationService::start(classification(), files));
        let generator = Arc::new(ScriptedGenerator::new(
            "培训要求共三条①，且不少于3天③。",
        ));
        let store = FakeStore {
            passages: three_passages(),
            ..Default::default()
        };
        let engine = engine(store, generator.clone(), classifier.clone(), settings());

        let response = engine.query(QUESTION, Some(3)).await.unwrap();

        assert_eq!(response.answer, "培训要求共三条①，且不少于3天③。");
        let indices: Vec<usize> = response.passages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(response.passages[1].text, "补充通知明确培训要求不少于3天。");

        assert_eq!(response.document_groups.len(), 2);
        assert_eq!(response.document_groups[0].title, "培训方案.txt");
        assert!(response.document_groups[0].has_restricted_form);
        assert_eq!(response.document_groups[1].title, "补充通知.txt");
        assert!(!response.document_groups[1].has_restricted_form);

        let prompt = generator.last_prompt();
        assert!(prompt.contains("[文档片段 1] ①"));
        assert!(prompt.contains("[文档片段 3] ③"));
        assert!(prompt.contains("来源: 培训方案.txt"));

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_generation() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator = Arc::new(ScriptedGenerator::new("不该被调用"));
        let engine = engine(
            FakeStore::default(),
            generator.clone(),
            classifier.clone(),
            settings(),
        );

        let response = engine.query(QUESTION, None).await.unwrap();

        assert_eq!(response.answer, NO_RESULT_ANSWER);
        assert!(response.passages.is_empty());
        assert!(response.document_groups.is_empty());
        assert_eq!(generator.calls(), 0);

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_uncited_answer_has_no_groups() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator = Arc::new(ScriptedGenerator::new(
            "根据提供的上下文，我无法找到相关信息",
        ));
        let store = FakeStore {
            passages: three_passages(),
            ..Default::default()
        };
        let engine = engine(store, generator.clone(), classifier.clone(), settings());

        let response = engine.query(QUESTION, Some(3)).await.unwrap();

        assert_eq!(generator.calls(), 1);
        assert!(response.passages.is_empty());
        assert!(response.document_groups.is_empty());

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator = Arc::new(ScriptedGenerator::new("①"));
        let engine = engine(
            FakeStore::default(),
            generator.clone(),
            classifier.clone(),
            settings(),
        );

        let err = engine.query("   ", None).await.unwrap_err();
        assert!(matches!(err, AppError::Knowledge(_)));
        assert_eq!(generator.calls(), 0);

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_generation_timeout_reported() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator =
            Arc::new(ScriptedGenerator::new("①").slow(Duration::from_secs(5)));
        let store = FakeStore {
            passages: three_passages(),
            ..Default::default()
        };
        let mut settings = settings();
        settings.generation_timeout = Duration::from_millis(50);
        let engine = engine(store, generator, classifier.clone(), settings);

        let err = engine.query(QUESTION, Some(3)).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, AppError::GenerationTimeout { .. }));

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_deadline_bounds_whole_query() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator = Arc::new(ScriptedGenerator::new("①"));
        let store = FakeStore {
            passages: three_passages(),
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let mut settings = settings();
        settings.request_timeout = Duration::from_millis(100);
        let engine = engine(store, generator.clone(), classifier.clone(), settings);

        let started = std::time::Instant::now();
        let err = engine.query(QUESTION, Some(3)).await.unwrap_err();

        assert!(matches!(err, AppError::RequestTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(generator.calls(), 0);

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_retrieval_failure_surfaces() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator = Arc::new(ScriptedGenerator::new("①"));
        let store = FakeStore {
            fail: true,
            ..Default::default()
        };
        let engine = engine(store, generator.clone(), classifier.clone(), settings());

        let err = engine.query(QUESTION, None).await.unwrap_err();
        assert!(matches!(err, AppError::Retrieval(_)));
        assert_eq!(generator.calls(), 0);

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_top_k_clamped_to_marker_alphabet() {
        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(CountingFileStore::default()),
        ));
        let generator = Arc::new(ScriptedGenerator::new("①"));
        let passages = (0..40)
            .map(|i| Passage::new(format!("第{}段 培训要求说明", i)).with_source(format!("/f/{}.md", i)))
            .collect();
        let store = FakeStore {
            passages,
            ..Default::default()
        };
        let engine = engine(store, generator.clone(), classifier.clone(), settings());

        engine.query(QUESTION, Some(50)).await.unwrap();

        let prompt = generator.last_prompt();
        assert_eq!(prompt.matches("[文档片段 ").count(), 10);
        assert!(prompt.contains("⑩"));

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_classification_cached_across_queries() {
        let files = Arc::new(CountingFileStore::default().with_file(ID_A, "公开形式：依申请公开"));
        let classifier = Arc::new(ClassificationService::start(classification(), files.clone()));
        let generator = Arc::new(ScriptedGenerator::new("培训要求见①。"));
        let store = FakeStore {
            passages: vec![passage(ID_A, "培训方案.txt", "培训要求共三条。")],
            ..Default::default()
        };
        let engine = engine(store, generator, classifier.clone(), settings());

        let first = engine.query(QUESTION, None).await.unwrap();
        let second = engine.query(QUESTION, None).await.unwrap();

        assert!(first.document_groups[0].has_restricted_form);
        assert!(second.document_groups[0].has_restricted_form);
        assert_eq!(files.reads.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.cached(ID_A), Some(true));
        assert!(classifier.stats().cache_hits >= 1);

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_classification_does_not_block_answer() {
        let files = Arc::new(CountingFileStore {
            delay: Some(Duration::from_secs(1)),
            ..Default::default()
        }
        .with_file(ID_A, "正文"));
        let classifier = Arc::new(ClassificationService::start(
            ClassificationSettings {
                wait_ceiling: Duration::from_millis(100),
                ..classification()
            },
            files,
        ));
        let generator = Arc::new(ScriptedGenerator::new("培训要求见①。"));
        let store = FakeStore {
            passages: vec![passage(ID_A, "培训方案.txt", "培训要求共三条。")],
            ..Default::default()
        };
        let engine = engine(store, generator, classifier.clone(), settings());

        let started = std::time::Instant::now();
        let response = engine.query(QUESTION, None).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(800));
        // No verdict yet, so the fail-closed default applies
        assert!(response.document_groups[0].has_restricted_form);
        assert_eq!(classifier.stats().fallbacks, 1);

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_local_files_end_to_end() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(format!("{}_培训方案.txt", ID_A)),
            "第一章 总则\n……\n公开形式: 不予公开\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join(format!("{}_考核办法.txt", ID_B)),
            "第一章 总则\n……\n公开形式：主动公开\n",
        )
        .unwrap();

        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(LocalFileStore::new(temp.path())),
        ));
        let generator = Arc::new(ScriptedGenerator::new("培训要求共三条①②。"));
        let store = FakeStore {
            passages: vec![
                passage(ID_A, "培训方案.txt", "培训要求共三条。"),
                passage(ID_B, "考核办法.txt", "培训要求包括考核。"),
            ],
            ..Default::default()
        };
        let engine = engine(store, generator, classifier.clone(), settings());

        let response = engine.query(QUESTION, None).await.unwrap();

        let restricted: HashMap<&str, bool> = response
            .document_groups
            .iter()
            .map(|g| (g.title.as_str(), g.has_restricted_form))
            .collect();
        assert_eq!(restricted.get("培训方案.txt"), Some(&true));
        assert_eq!(restricted.get("考核办法.txt"), Some(&false));
        assert_eq!(response.document_groups[0].file_id.as_deref(), Some(ID_A));

        classifier.shutdown().await;
    }

    #[tokio::test]
    async fn test_plain_prefix_names_not_conflated() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("制度_甲.txt"), "公开形式：不予公开\n").unwrap();
        std::fs::write(temp.path().join("制度_乙.txt"), "公开形式：主动公开\n").unwrap();

        let classifier = Arc::new(ClassificationService::start(
            classification(),
            Arc::new(LocalFileStore::new(temp.path())),
        ));
        let generator = Arc::new(ScriptedGenerator::new("培训要求共三条①②。"));
        let store = FakeStore {
            passages: vec![
                Passage::new("培训要求共三条。")
                    .with_source(temp.path().join("制度_甲.txt").to_string_lossy()),
                Passage::new("培训要求包括考核。")
                    .with_source(temp.path().join("制度_乙.txt").to_string_lossy()),
            ],
            ..Default::default()
        };
        let engine = engine(store, generator, classifier.clone(), settings());

        let response = engine.query(QUESTION, None).await.unwrap();
        assert_eq!(response.document_groups.len(), 2);

        let second = response
            .document_groups
            .iter()
            .find(|g| g.title == "制度_乙.txt")
            .unwrap();
        assert!(!second.has_restricted_form);
        assert!(response.document_groups.iter().all(|g| g.file_id.is_none()));
        assert_eq!(classifier.stats().submitted, 0);

        classifier.shutdown().await;
    }
}
