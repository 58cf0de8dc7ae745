//! Access to stored source files.
//!
//! Stored files are named `{fileID}_{originalName}`; files uploaded by older
//! releases are named `{fileID}{ext}`.

use super::ClassificationError;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Page separator in extracted text files.
const PAGE_BREAK: char = '\x0c';

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Blocking file access used by classification workers.
pub trait FileStore: Send + Sync + std::fmt::Debug {
    /// Path of the stored file for `file_id`.
    fn locate(&self, file_id: &str, title: &str) -> Result<PathBuf, ClassificationError>;

    /// At most the last `n` bytes of the file.
    fn read_last_bytes(&self, path: &Path, n: usize) -> Result<Vec<u8>, ClassificationError>;

    /// The document's text, one entry per page.
    fn load_document(&self, path: &Path) -> Result<Vec<String>, ClassificationError>;

    /// Whether files of `file_type` can be read for classification at all.
    fn supports(&self, _file_type: &str) -> bool {
        true
    }
}

/// Formats `LocalFileStore` reads without an extraction service.
const TEXT_FORMATS: [&str; 3] = ["txt", "md", "text"];

/// Files kept in one local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    files_dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
        }
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    fn scan(&self, file_id: &str) -> Option<PathBuf> {
        let named = format!("{}_", file_id);
        let legacy = format!("{}.", file_id);

        WalkDir::new(&self.files_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                let name = entry.file_name().to_string_lossy();
                name.starts_with(&named) || name.starts_with(&legacy)
            })
            .map(|entry| entry.into_path())
    }
}

impl FileStore for LocalFileStore {
    fn locate(&self, file_id: &str, title: &str) -> Result<PathBuf, ClassificationError> {
        if file_id.is_empty() || file_id.contains(is_separator) || file_id.contains("..") {
            return Err(ClassificationError::NotFound(file_id.to_string()));
        }

        if !title.is_empty() && !title.contains(is_separator) {
            let named = self.files_dir.join(format!("{}_{}", file_id, title));
            if named.is_file() {
                return Ok(named);
            }

            if let Some(ext) = Path::new(title).extension() {
                let legacy = self
                    .files_dir
                    .join(format!("{}.{}", file_id, ext.to_string_lossy()));
                if legacy.is_file() {
                    return Ok(legacy);
                }
            }
        }

        self.scan(file_id)
            .ok_or_else(|| ClassificationError::NotFound(file_id.to_string()))
    }

    fn read_last_bytes(&self, path: &Path, n: usize) -> Result<Vec<u8>, ClassificationError> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let take = len.min(n as u64);

        file.seek(SeekFrom::Start(len - take))?;
        let mut buffer = Vec::with_capacity(take as usize);
        file.take(take).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn load_document(&self, path: &Path) -> Result<Vec<String>, ClassificationError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            format if TEXT_FORMATS.contains(&format) => {
                let bytes = std::fs::read(path)?;
                let text = String::from_utf8_lossy(&bytes);
                Ok(text.split(PAGE_BREAK).map(str::to_string).collect())
            }
            // Binary formats need an extraction service
            _ => Err(ClassificationError::Unsupported(if ext.is_empty() {
                "no extension".to_string()
            } else {
                ext
            })),
        }
    }

    fn supports(&self, file_type: &str) -> bool {
        TEXT_FORMATS.contains(&file_type.to_lowercase().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_named_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("abc_通知.txt"), "x").unwrap();
        let store = LocalFileStore::new(temp.path());

        let path = store.locate("abc", "通知.txt").unwrap();
        assert_eq!(path, temp.path().join("abc_通知.txt"));
    }

    #[test]
    fn test_locate_legacy_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("abc.pdf"), "x").unwrap();
        let store = LocalFileStore::new(temp.path());

        let path = store.locate("abc", "方案.pdf").unwrap();
        assert_eq!(path, temp.path().join("abc.pdf"));
    }

    #[test]
    fn test_locate_by_scan_when_title_differs() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("abc_原始名称.docx"), "x").unwrap();
        std::fs::write(temp.path().join("abcd_其他.docx"), "x").unwrap();
        let store = LocalFileStore::new(temp.path());

        let path = store.locate("abc", "显示名称.docx").unwrap();
        assert_eq!(path, temp.path().join("abc_原始名称.docx"));
    }

    #[test]
    fn test_locate_missing_and_traversal() {
        let temp = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp.path());

        assert_eq!(
            store.locate("abc", "x.txt"),
            Err(ClassificationError::NotFound("abc".to_string()))
        );
        assert!(store.locate("../etc", "passwd").is_err());
        assert!(store.locate("", "x.txt").is_err());
    }

    #[test]
    fn test_read_last_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "0123456789").unwrap();
        let store = LocalFileStore::new(temp.path());

        assert_eq!(store.read_last_bytes(&path, 3).unwrap(), b"789");
        assert_eq!(store.read_last_bytes(&path, 100).unwrap(), b"0123456789");
    }

    #[test]
    fn test_read_last_bytes_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        let store = LocalFileStore::new(temp.path());

        assert!(store.read_last_bytes(&path, 400).unwrap().is_empty());
    }

    #[test]
    fn test_load_document_pages() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        std::fs::write(&path, "第一页\x0c第二页").unwrap();
        let store = LocalFileStore::new(temp.path());

        let pages = store.load_document(&path).unwrap();
        assert_eq!(pages, vec!["第一页", "第二页"]);
    }

    #[test]
    fn test_supports_text_formats_only() {
        let store = LocalFileStore::new("files");
        assert!(store.supports("txt"));
        assert!(store.supports("TXT"));
        assert!(!store.supports("pdf"));
        assert!(!store.supports("docx"));
    }

    #[test]
    fn test_load_document_binary_unsupported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let store = LocalFileStore::new(temp.path());

        assert_eq!(
            store.load_document(&path),
            Err(ClassificationError::Unsupported("pdf".to_string()))
        );
    }
}
