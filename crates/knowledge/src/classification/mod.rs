//! Restriction-marker classification.
//!
//! Decides per source document whether its closing text carries a marker
//! that forbids offering it for download. Verdicts are computed by a fixed
//! pool of background workers and cached per file ID for the life of the
//! process.

pub mod file_store;
pub mod markers;
mod service;

pub use file_store::{FileStore, LocalFileStore};
pub use markers::{is_eligible, MarkerSet, DEFAULT_MARKERS, ELIGIBLE_FILE_TYPES};
pub use service::{
    classify_file, classify_path, ClassificationService, ClassificationSettings,
    ClassificationStats,
};

use kbqa_core::AppError;
use std::time::Duration;
use thiserror::Error;

/// Why a single classification did not produce a verdict.
///
/// None of these abort a query; the caller substitutes the fail-safe value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("Classification queue is full")]
    QueueFull,

    #[error("Classification pool is shut down")]
    PoolClosed,

    #[error("Classification worker panicked: {0}")]
    WorkerPanic(String),

    #[error("Reading the document exceeded {0:?}")]
    ReadTimeout(Duration),

    #[error("Unsupported document format: {0}")]
    Unsupported(String),

    #[error("Stored file not found for '{0}'")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Document has no text")]
    EmptyDocument,
}

impl From<std::io::Error> for ClassificationError {
    fn from(err: std::io::Error) -> Self {
        ClassificationError::Io(err.to_string())
    }
}

impl From<ClassificationError> for AppError {
    fn from(err: ClassificationError) -> Self {
        AppError::Classification(err.to_string())
    }
}
