//! Prompt system for KBQA.
//!
//! Builds the citation-enforcing answer prompt:
//! - YAML-overridable prompt definitions
//! - Handlebars template rendering
//! - The fixed citation marker alphabet shared with answer parsing

pub mod builder;
pub mod citation;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_answer_prompt, PASSAGE_CHAR_BUDGET, REFUSAL_PHRASE};
pub use citation::{citation_marker, CITATION_MARKERS};
pub use loader::{default_answer_prompt, load_answer_prompt, load_prompt, ANSWER_PROMPT_ID};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptPassage};
