//! Local filesystem resources
//!
//! Snapshots file metadata into a [`FileHandle`] the range responder can read.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::http::mime;
use crate::http::responder::FileHandle;

/// Metadata snapshot of a file on disk
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    exists: bool,
    size: u64,
    modified: DateTime<Utc>,
    mime_type: &'static str,
}

impl LocalFile {
    /// Stat `path`. Missing files, directories, and unreadable metadata all
    /// produce a handle that reports `exists() == false`.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime::content_type_for_path(&path);

        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Self {
                size: meta.len(),
                modified: meta.modified().map_or_else(|_| Utc::now(), DateTime::from),
                exists: true,
                mime_type,
                path,
            },
            _ => Self {
                path,
                exists: false,
                size: 0,
                modified: DateTime::UNIX_EPOCH,
                mime_type,
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileHandle for LocalFile {
    fn exists(&self) -> bool {
        self.exists
    }

    fn size_in_bytes(&self) -> u64 {
        self.size
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.modified
    }

    fn mime_type(&self) -> &str {
        self.mime_type
    }
}
