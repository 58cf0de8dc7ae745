//! Error types for KBQA.
//!
//! One enum covers every failure category that can reach a caller. Failures
//! inside best-effort background work (restriction-marker classification) use
//! their own type in the knowledge crate and never surface here.

use thiserror::Error;

/// Unified error type for KBQA.
///
/// All fallible public functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors (transport, auth, malformed payloads)
    #[error("LLM error: {0}")]
    Llm(String),

    /// The passage store could not be queried
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Answer generation exceeded its deadline
    #[error(
        "Answer generation timed out after {secs}s. Try: 1) retrieve fewer passages (lower --top-k) \
         2) check network connectivity 3) check the model provider's service status"
    )]
    GenerationTimeout { secs: u64 },

    /// The whole query exceeded its deadline
    #[error("Query exceeded its {secs}s deadline")]
    RequestTimeout { secs: u64 },

    /// The generator returned an error
    #[error("Answer generation failed: {0}")]
    Generation(String),

    /// Knowledge base and corpus errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Restriction-marker classification errors surfaced to a caller
    #[error("Classification error: {0}")]
    Classification(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error is a deadline expiry rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::GenerationTimeout { .. } | AppError::RequestTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
