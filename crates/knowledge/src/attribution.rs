//! Attribution of cited passages to source documents.
//!
//! Each cited passage is enriched in its own task and sent over a bounded
//! channel to a single collector, which owns the group map. The collector
//! stops at the request's enrichment deadline and aborts whatever is left.

use crate::types::{DocumentGroup, Passage, PassageResult, SourceType};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

/// Title for passages without any usable name.
pub const UNTITLED: &str = "未命名文档";

/// Upper bound on the fan-in channel buffer.
const MAX_FAN_IN_BUFFER: usize = 1000;

/// Everything derived from one cited passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Source path, or the title when there is none
    pub group_key: String,
    pub result: PassageResult,
    /// Group holding only this passage
    pub group: DocumentGroup,
}

/// Cited passages grouped by source document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouped {
    /// Unordered; the response assembler sorts them
    pub groups: Vec<DocumentGroup>,
    pub results: Vec<PassageResult>,
}

/// Drop a `{uuid}_` prefix from a stored file name.
pub fn strip_uuid_prefix(file_name: &str) -> &str {
    match file_name.split_once('_') {
        Some((prefix, rest)) if !rest.is_empty() && is_uuid(prefix) => rest,
        _ => file_name,
    }
}

fn is_uuid(text: &str) -> bool {
    text.len() == 36 && Uuid::parse_str(text).is_ok()
}

/// File ID of a stored name: `{uuid}_{name}`, or legacy `{uuid}.{ext}`.
///
/// Any other name has no file ID; a non-UUID prefix is not unique per file.
fn file_id_of(file_name: &str) -> Option<String> {
    if let Some((prefix, rest)) = file_name.split_once('_') {
        if !rest.is_empty() && is_uuid(prefix) {
            return Some(prefix.to_string());
        }
    }
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| Path::new(file_name).extension().is_some() && is_uuid(stem))
        .map(str::to_string)
}

fn extension_of(title: &str) -> Option<String> {
    Path::new(title)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn base_name(source: &str) -> &str {
    source.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(source)
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// First `n` characters of `text`, with "..." when cut.
pub fn preview(text: &str, n: usize) -> String {
    match text.char_indices().nth(n) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Derive title, source type, file type and file ID for a cited passage.
///
/// `index` is the passage's 1-based position in the prompt. The stored file
/// name, when present, takes priority over the source path.
pub fn derive_attribution(index: usize, passage: &Passage, preview_chars: usize) -> Attribution {
    let source = passage.source_path.as_deref().unwrap_or_default();

    let mut title = String::new();
    let mut source_type = SourceType::File;
    let mut file_type = None;
    let mut file_id = None;

    if is_url(source) {
        source_type = SourceType::Url;
        title = source.to_string();
    } else if !source.is_empty() {
        let name = base_name(source);
        title = strip_uuid_prefix(name).to_string();
        file_id = file_id_of(name);
        file_type = extension_of(&title);
    }

    if let Some(file_name) = passage.file_name.as_deref().filter(|n| !n.is_empty()) {
        let original = strip_uuid_prefix(file_name);
        title = original.to_string();
        if let Some(id) = file_id_of(file_name) {
            file_id = Some(id);
        }
        if let Some(ext) = extension_of(original) {
            file_type = Some(ext);
        }
    }

    if title.is_empty() {
        title = UNTITLED.to_string();
    }

    let result = PassageResult {
        text: passage.text.clone(),
        index,
        source_path: passage.source_path.clone().filter(|s| !s.is_empty()),
        title: title.clone(),
        preview: preview(&passage.text, preview_chars),
    };

    let group_key = if source.is_empty() {
        title.clone()
    } else {
        source.to_string()
    };

    Attribution {
        group_key,
        group: DocumentGroup {
            title,
            source_path: result.source_path.clone(),
            source_type,
            file_type,
            file_id,
            chunks: vec![result.clone()],
            has_restricted_form: false,
        },
        result,
    }
}

#[derive(Default)]
struct Collector {
    groups: HashMap<String, DocumentGroup>,
    results: Vec<PassageResult>,
}

impl Collector {
    fn merge(&mut self, attribution: Attribution) {
        self.results.push(attribution.result.clone());

        match self.groups.get_mut(&attribution.group_key) {
            Some(existing) => {
                if existing.file_type.is_none() {
                    existing.file_type = attribution.group.file_type;
                }
                if existing.file_id.is_none() {
                    existing.file_id = attribution.group.file_id;
                }
                existing.chunks.push(attribution.result);
            }
            None => {
                self.groups
                    .insert(attribution.group_key, attribution.group);
            }
        }
    }

    fn finish(self) -> Grouped {
        Grouped {
            groups: self.groups.into_values().collect(),
            results: self.results,
        }
    }
}

/// Enrich and group every passage marked as used.
///
/// `passages` is the exact list sent to the generator; `used` maps 1-based
/// positions in it to whether they were cited. Passages not merged by
/// `deadline` are left out.
pub async fn group_cited(
    passages: &[Passage],
    used: &BTreeMap<usize, bool>,
    deadline: Instant,
    preview_chars: usize,
) -> Grouped {
    let cited: Vec<(usize, Passage)> = used
        .iter()
        .filter(|(_, is_used)| **is_used)
        .filter_map(|(&index, _)| {
            index
                .checked_sub(1)
                .and_then(|i| passages.get(i))
                .map(|p| (index, p.clone()))
        })
        .collect();

    if cited.is_empty() {
        return Grouped::default();
    }

    let (tx, mut rx) = mpsc::channel(cited.len().clamp(1, MAX_FAN_IN_BUFFER));
    let mut tasks = JoinSet::new();

    for (index, passage) in cited {
        let tx = tx.clone();
        tasks.spawn(async move {
            let attribution = derive_attribution(index, &passage, preview_chars);
            // The collector is gone once the deadline fires
            let _ = tx.send(attribution).await;
        });
    }
    drop(tx);

    let mut collector = Collector::default();
    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(attribution) => collector.merge(attribution),
                None => break,
            },
            _ = &mut expiry => {
                tracing::warn!(
                    "Attribution deadline reached with {} tasks outstanding",
                    tasks.len()
                );
                tasks.abort_all();
                break;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::warn!("Attribution task panicked: {}", e);
            }
        }
    }

    collector.finish()
}
