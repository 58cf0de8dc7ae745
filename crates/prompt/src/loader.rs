//! Prompt loader for YAML prompt definitions.

use crate::builder::DEFAULT_ANSWER_TEMPLATE;
use crate::types::PromptDefinition;
use kbqa_core::{AppError, AppResult};
use std::path::Path;

/// Identifier of the answer prompt override file (`.kbqa/prompts/answer.yml`).
pub const ANSWER_PROMPT_ID: &str = "answer";

/// Load a prompt definition by ID from `.kbqa/prompts/<id>.yml`.
///
/// # Example
/// ```no_run
/// use kbqa_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = workspace_path
        .join(".kbqa/prompts")
        .join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// The answer prompt: the workspace override if present, else the built-in one.
pub fn load_answer_prompt(workspace_path: &Path) -> AppResult<PromptDefinition> {
    let override_file = workspace_path
        .join(".kbqa/prompts")
        .join(format!("{}.yml", ANSWER_PROMPT_ID));

    if override_file.exists() {
        load_prompt(workspace_path, ANSWER_PROMPT_ID)
    } else {
        Ok(default_answer_prompt())
    }
}

/// Built-in citation-enforcing answer prompt.
pub fn default_answer_prompt() -> PromptDefinition {
    PromptDefinition {
        id: "kbqa.answer.default".to_string(),
        title: "Grounded answer with citation markers".to_string(),
        api_version: "1.0".to_string(),
        created_by: "kbqa".to_string(),
        system: None,
        template: DEFAULT_ANSWER_TEMPLATE.to_string(),
    }
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    // Without the passage loop there is nothing for the model to cite.
    if !def.template.contains("passages") {
        return Err(AppError::Prompt(format!(
            "Prompt '{}' never references `passages`",
            def.id
        )));
    }

    Ok(())
}
