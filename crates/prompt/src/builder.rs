//! Answer prompt builder.
//!
//! Numbers the selected passages with the citation alphabet, truncates each
//! one to a fixed budget, and renders them with the question through a
//! Handlebars template.

use crate::citation::citation_marker;
use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptPassage};
use handlebars::Handlebars;
use kbqa_core::{AppError, AppResult};
use serde::Serialize;

/// Maximum characters of a passage body placed in the prompt.
pub const PASSAGE_CHAR_BUDGET: usize = 800;

/// Sentence the model must answer with when nothing in the context applies.
pub const REFUSAL_PHRASE: &str = "根据提供的上下文，我无法找到相关信息";

/// Built-in answer template.
pub const DEFAULT_ANSWER_TEMPLATE: &str = r#"你是一名严谨的知识库问答助手。请先阅读下面的文档片段，经过分析后再回答问题。

【作答规则】
1. 逐一判断每个文档片段是否真的与问题相关，只采用相关的片段，无关片段一律忽略。
2. 用自己的话归纳、整合信息，不要原样照抄片段内容。多个片段的信息要组织成连贯、有条理的回答；问题涉及多个方面时分点说明。
3. 只依据给出的文档片段作答，不得编造或推测。
4. 引用标注是强制要求：凡是用到某个片段内容的句子，必须在该句末尾紧跟该片段的编号标记。第1个片段用①，第2个片段用②，依此类推；同一句话来自多个片段时可连写，例如①②。没有标注的引用视为不合格。
5. 直接陈述内容，不要写“根据文档片段X”“片段X提到”之类的前缀。正确示例：“培训时长不少于3天①”。
6. 如果所有片段都与问题无关，请直接回答“{{refusal}}”，不要勉强使用无关内容。

【文档片段】
{{#each passages}}
[文档片段 {{number}}] {{marker}}
{{body}}
{{#if source}}来源: {{source}}
{{/if}}
{{/each}}

【问题】
{{question}}

请先检查各片段的相关性，再给出完整的回答，并确保每处引用都带有对应的编号标记。
"#;

#[derive(Debug, Serialize)]
struct RenderedPassage {
    number: usize,
    marker: String,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnswerPromptContext<'a> {
    question: &'a str,
    refusal: &'a str,
    passages: Vec<RenderedPassage>,
}

/// Build the answer prompt for `question` over `passages`.
///
/// Passage `i` (0-based) is labelled with marker `i + 1`; the caller's order
/// is the citation order, so it must not change after this call.
///
/// # Example
/// ```no_run
/// use kbqa_prompt::{build_answer_prompt, default_answer_prompt, PromptPassage};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let passages = vec![PromptPassage::new("培训不少于3天", Some("plan.txt".to_string()))];
/// let built = build_answer_prompt(&default_answer_prompt(), "培训要求有几条", &passages)?;
/// assert!(built.user.contains("①"));
/// # Ok(())
/// # }
/// ```
pub fn build_answer_prompt(
    definition: &PromptDefinition,
    question: &str,
    passages: &[PromptPassage],
) -> AppResult<BuiltPrompt> {
    tracing::debug!(
        "Building prompt '{}' with {} passages",
        definition.id,
        passages.len()
    );

    let mut truncated_passages = 0;
    let rendered: Vec<RenderedPassage> = passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            let (body, truncated) = truncate_chars(&passage.text, PASSAGE_CHAR_BUDGET);
            if truncated {
                truncated_passages += 1;
            }
            RenderedPassage {
                number: i + 1,
                marker: citation_marker(i + 1),
                body,
                source: passage.source.clone().filter(|s| !s.is_empty()),
            }
        })
        .collect();

    let context = AnswerPromptContext {
        question,
        refusal: REFUSAL_PHRASE,
        passages: rendered,
    };

    let user = render_template(&definition.template, &context)?;

    Ok(BuiltPrompt {
        system: definition.system.clone(),
        user,
        metadata: BuiltPromptMetadata {
            source_prompt_id: definition.id.clone(),
            passage_count: passages.len(),
            truncated_passages,
        },
    })
}

/// Cut `text` to at most `budget` characters, appending "..." when cut.
fn truncate_chars(text: &str, budget: usize) -> (String, bool) {
    match text.char_indices().nth(budget) {
        Some((byte_idx, _)) => (format!("{}...", &text[..byte_idx]), true),
        None => (text.to_string(), false),
    }
}

/// Render a Handlebars template with serializable data.
fn render_template<T: Serialize>(template: &str, data: &T) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", data)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
