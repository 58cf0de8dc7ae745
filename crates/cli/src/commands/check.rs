//! Check command handler.
//!
//! Runs the restriction-marker check on a single local file. Only plain
//! text is read directly; pdf, doc and docx need a text extraction service.

use clap::Args;
use kbqa_core::{config::AppConfig, AppError, AppResult};
use kbqa_knowledge::classification::{classify_path, is_eligible, FileStore};
use kbqa_knowledge::{ClassificationSettings, LocalFileStore};
use std::path::{Path, PathBuf};

/// Check one stored text file for a restriction marker (pdf/doc/docx need text extraction)
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// File to check
    pub path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    /// Execute the check command.
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing check command");

        if !self.path.is_file() {
            return Err(AppError::Knowledge(format!(
                "Not a file: {:?}",
                self.path
            )));
        }

        let file_type = file_type_of(&self.path);
        let restricted = if is_eligible(file_type.as_deref()) {
            let settings = ClassificationSettings::from_config(&config.classification);
            let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
            let store = LocalFileStore::new(dir);
            let file_type = file_type.as_deref().unwrap_or_default();
            if !store.supports(file_type) {
                return Err(AppError::Knowledge(format!(
                    "Cannot read {} files without a text extraction service: {:?}",
                    file_type, self.path
                )));
            }
            classify_path(
                &store,
                &settings.markers,
                &self.path,
                file_type,
                settings.tail_chars,
            )?
        } else {
            tracing::debug!("File type {:?} is never restricted", file_type);
            false
        };

        if self.json {
            let output = serde_json::json!({
                "path": self.path,
                "fileType": file_type,
                "hasRestrictedForm": restricted,
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else if restricted {
            println!("{}: restricted", self.path.display());
        } else {
            println!("{}: not restricted", self.path.display());
        }

        Ok(())
    }
}

fn file_type_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}
