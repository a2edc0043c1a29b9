//! Upload materialization module
//!
//! Moves the uploaded files of one request into a private staging directory
//! so the domain layer only ever sees plain filesystem paths.
//!
//! An [`UploadStaging`] value is the per-request context: create one per
//! request, pass it by reference, and drop it when the request is done. The
//! staging directory is created lazily, at most once, and removed on drop.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

use crate::logger;

const STAGING_PREFIX: &str = "upload-";

/// Upload staging failures
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to create staging directory under {root}: {source}")]
    StagingDir { root: PathBuf, source: io::Error },
    #[error("Upload has no usable client filename: {0:?}")]
    InvalidFilename(Option<String>),
    #[error("Failed to move upload to {destination}: {source}")]
    MoveFailed {
        destination: PathBuf,
        source: io::Error,
    },
}

/// A file received from a client, not yet placed anywhere permanent
pub trait UploadedFile {
    /// Filename as sent by the client
    fn client_filename(&self) -> Option<&str>;

    /// Move the upload to `destination`
    fn move_to(&mut self, destination: &Path) -> io::Result<()>;
}

/// Upload held in memory
#[derive(Debug, Clone)]
pub struct BufferedUpload {
    filename: Option<String>,
    data: Vec<u8>,
    moved: bool,
}

impl BufferedUpload {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: Some(filename.into()),
            data: data.into(),
            moved: false,
        }
    }

    /// Upload whose client sent no filename
    pub fn anonymous(data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: None,
            data: data.into(),
            moved: false,
        }
    }
}

impl UploadedFile for BufferedUpload {
    fn client_filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    fn move_to(&mut self, destination: &Path) -> io::Result<()> {
        if self.moved {
            return Err(io::Error::other("upload has already been moved"));
        }
        fs::write(destination, &self.data)?;
        self.data = Vec::new();
        self.moved = true;
        Ok(())
    }
}

/// Upload already spooled to a file on disk
#[derive(Debug, Clone)]
pub struct SpooledUpload {
    filename: Option<String>,
    path: PathBuf,
}

impl SpooledUpload {
    pub fn new(filename: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename,
            path: path.into(),
        }
    }
}

impl UploadedFile for SpooledUpload {
    fn client_filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    fn move_to(&mut self, destination: &Path) -> io::Result<()> {
        // rename fails across filesystems, fall back to copy + remove
        if fs::rename(&self.path, destination).is_err() {
            fs::copy(&self.path, destination)?;
            fs::remove_file(&self.path)?;
        }
        self.path = destination.to_path_buf();
        Ok(())
    }
}

/// An upload after it was moved into staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
}

/// Per-request staging area
#[derive(Debug)]
pub struct UploadStaging {
    root: PathBuf,
    dir: Option<TempDir>,
}

impl UploadStaging {
    /// Stage under the system temp directory
    pub fn new() -> Self {
        Self::in_root(std::env::temp_dir())
    }

    /// Stage under `root`
    pub fn in_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dir: None,
        }
    }

    /// The staging directory, if it has been created
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Get the staging directory, creating it on first use
    pub fn staging_dir(&mut self) -> Result<&Path, UploadError> {
        if self.dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempdir_in(&self.root)
                .map_err(|source| UploadError::StagingDir {
                    root: self.root.clone(),
                    source,
                })?;
            self.dir = Some(dir);
        }

        self.dir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| UploadError::StagingDir {
                root: self.root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "staging directory missing"),
            })
    }

    /// Move one upload into staging under its client filename
    pub fn try_materialize(
        &mut self,
        upload: &mut impl UploadedFile,
    ) -> Result<StagedFile, UploadError> {
        let filename = upload.client_filename().map(str::to_string);
        let name = filename
            .as_deref()
            .filter(|n| is_plain_filename(n))
            .ok_or_else(|| UploadError::InvalidFilename(filename.clone()))?;

        let destination = self.staging_dir()?.join(name);
        upload
            .move_to(&destination)
            .map_err(|source| UploadError::MoveFailed {
                destination: destination.clone(),
                source,
            })?;

        Ok(StagedFile { path: destination })
    }

    /// Move one upload; failures are logged and yield `None`
    pub fn materialize(&mut self, key: &str, upload: &mut impl UploadedFile) -> Option<StagedFile> {
        match self.try_materialize(upload) {
            Ok(staged) => Some(staged),
            Err(e) => {
                logger::log_warning(&format!("Upload '{key}' not staged: {e}"));
                None
            }
        }
    }

    /// Move every named upload, keeping input order. One failed entry never
    /// aborts the batch.
    pub fn materialize_all<'a, U, I>(&mut self, uploads: I) -> Vec<(String, Option<StagedFile>)>
    where
        U: UploadedFile + 'a,
        I: IntoIterator<Item = (&'a str, &'a mut U)>,
    {
        uploads
            .into_iter()
            .map(|(key, upload)| (key.to_string(), self.materialize(key, upload)))
            .collect()
    }
}

impl Default for UploadStaging {
    fn default() -> Self {
        Self::new()
    }
}

/// A single normal path component, so the upload cannot leave staging
fn is_plain_filename(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
