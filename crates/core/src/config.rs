//! Configuration management for KBQA.
//!
//! Configuration is merged from several sources, later ones winning:
//! - Built-in defaults
//! - Config file (`.kbqa/config.yaml` or `KBQA_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with stored files and prompt
//! overrides living under `.kbqa/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the generator factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 5] = ["ollama", "openai", "dashscope", "moonshot", "kimi"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .kbqa/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generator provider (e.g., "ollama", "dashscope", "moonshot")
    pub provider: String,

    /// Generator model identifier
    pub model: String,

    /// API key for the generator provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Retrieval sizing
    pub retrieval: RetrievalConfig,

    /// Generator deadlines and sampling
    pub generation: GenerationConfig,

    /// Restriction-marker classification pool
    pub classification: ClassificationConfig,

    /// Response size bounds
    pub response: ResponseConfig,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(rename = "activeEmbeddingProvider")]
    pub active_embedding_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
///
/// Hosted providers all speak the OpenAI chat-completions dialect, so they
/// share one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    OpenAICompatible {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model name configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAICompatible { model, .. } => model,
            ProviderConfig::Ollama { model, .. } => model,
        }
    }

    /// Endpoint override, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAICompatible { endpoint, .. } => endpoint.as_deref(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint),
        }
    }
}

/// Retrieval sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages kept for the prompt when the caller does not ask for a count
    #[serde(rename = "topK")]
    pub top_k: usize,

    /// Lower bound on candidates fetched from the store
    #[serde(rename = "minOverFetch")]
    pub min_over_fetch: usize,

    /// Upper bound on candidates fetched from the store
    #[serde(rename = "maxOverFetch")]
    pub max_over_fetch: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_over_fetch: 15,
            max_over_fetch: 50,
        }
    }
}

/// Generator deadlines and sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Deadline for the generator call alone
    #[serde(rename = "timeoutSecs")]
    pub timeout_secs: u64,

    /// Deadline for the whole query
    #[serde(rename = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            request_timeout_secs: 150,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Restriction-marker classification pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Background worker count
    pub workers: usize,

    /// Bounded task queue capacity
    #[serde(rename = "queueCapacity")]
    pub queue_capacity: usize,

    /// How long a request waits for pending verdicts
    #[serde(rename = "waitCeilingMs")]
    pub wait_ceiling_ms: u64,

    /// Per-task I/O deadline inside a worker
    #[serde(rename = "readDeadlineMs")]
    pub read_deadline_ms: u64,

    /// How much of the document tail is inspected
    #[serde(rename = "tailChars")]
    pub tail_chars: usize,

    /// Verdict used when classification cannot complete
    #[serde(rename = "failClosed")]
    pub fail_closed: bool,

    /// Directory holding stored source files, relative to the workspace
    #[serde(rename = "filesDir")]
    pub files_dir: PathBuf,

    /// Marker phrasings; empty means the built-in list
    pub markers: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 100,
            wait_ceiling_ms: 500,
            read_deadline_ms: 1500,
            tail_chars: 100,
            fail_closed: true,
            files_dir: PathBuf::from(".kbqa/files"),
            markers: Vec::new(),
        }
    }
}

/// Response size bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    #[serde(rename = "maxGroups")]
    pub max_groups: usize,

    #[serde(rename = "maxChunksPerGroup")]
    pub max_chunks_per_group: usize,

    #[serde(rename = "maxChunkChars")]
    pub max_chunk_chars: usize,

    #[serde(rename = "previewChars")]
    pub preview_chars: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_groups: 50,
            max_chunks_per_group: 20,
            max_chunk_chars: 2000,
            preview_chars: 200,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    retrieval: Option<RetrievalConfig>,
    generation: Option<GenerationConfig>,
    classification: Option<ClassificationConfig>,
    response: Option<ResponseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "qwen2.5:1.5b".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            classification: ClassificationConfig::default(),
            response: ResponseConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `KBQA_WORKSPACE`: Override workspace path
    /// - `KBQA_CONFIG`: Path to config file
    /// - `KBQA_PROVIDER`: Generator provider
    /// - `KBQA_MODEL`: Model identifier
    /// - `KBQA_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use kbqa_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("KBQA_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("KBQA_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.kbqa_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("KBQA_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("KBQA_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("KBQA_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok().or(config.log_level);

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();
            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }
            result.llm = Some(llm);
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }
        if let Some(classification) = config_file.classification {
            result.classification = classification;
        }
        if let Some(response) = config_file.response {
            result.response = response;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .kbqa directory.
    pub fn kbqa_dir(&self) -> PathBuf {
        self.workspace.join(".kbqa")
    }

    /// Resolve the stored-files directory against the workspace.
    pub fn files_dir(&self) -> PathBuf {
        if self.classification.files_dir.is_absolute() {
            self.classification.files_dir.clone()
        } else {
            self.workspace.join(&self.classification.files_dir)
        }
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Resolve API key for a provider.
    ///
    /// `KBQA_API_KEY` wins; otherwise the provider's `apiKeyEnv` is read.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAICompatible { api_key_env, .. }) => {
                std::env::var(&api_key_env).ok()
            }
            _ => None,
        }
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.to_lowercase();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if provider != "ollama" && self.resolve_api_key(&provider).is_none() {
            return Err(AppError::Config(format!(
                "Provider '{}' requires an API key (set KBQA_API_KEY or apiKeyEnv)",
                self.provider
            )));
        }

        let c = &self.classification;
        if c.workers == 0 {
            return Err(AppError::Config(
                "classification.workers must be at least 1".to_string(),
            ));
        }
        if c.queue_capacity == 0 {
            return Err(AppError::Config(
                "classification.queueCapacity must be at least 1".to_string(),
            ));
        }
        if c.tail_chars == 0 {
            return Err(AppError::Config(
                "classification.tailChars must be at least 1".to_string(),
            ));
        }

        let g = &self.generation;
        if g.timeout_secs == 0 || g.timeout_secs >= g.request_timeout_secs {
            return Err(AppError::Config(format!(
                "generation.timeoutSecs ({}) must be non-zero and shorter than requestTimeoutSecs ({})",
                g.timeout_secs, g.request_timeout_secs
            )));
        }

        let r = &self.retrieval;
        if r.top_k == 0 || r.min_over_fetch > r.max_over_fetch {
            return Err(AppError::Config(format!(
                "retrieval bounds are inconsistent: topK={}, minOverFetch={}, maxOverFetch={}",
                r.top_k, r.min_over_fetch, r.max_over_fetch
            )));
        }

        Ok(())
    }
}
