//! Prompt types for KBQA.

use serde::{Deserialize, Serialize};

/// A prompt definition, built in or loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Creator identifier
    #[serde(rename = "createdBy", default)]
    pub created_by: String,

    /// Optional system message sent alongside the rendered template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Template string with Handlebars syntax.
    ///
    /// Available variables: `question`, `refusal`, and `passages`, a list of
    /// `{ number, marker, body, source }`.
    pub template: String,
}

/// A passage as handed to the prompt builder, in final prompt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPassage {
    pub text: String,
    pub source: Option<String>,
}

impl PromptPassage {
    pub fn new(text: impl Into<String>, source: Option<String>) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    #[serde(rename = "sourcePromptId")]
    pub source_prompt_id: String,

    /// Passages embedded in the prompt
    #[serde(rename = "passageCount")]
    pub passage_count: usize,

    /// How many of them were cut to the character budget
    #[serde(rename = "truncatedPassages")]
    pub truncated_passages: usize,
}
