//! Upload scratch area
//!
//! Uploads are streamed to `<upload_dir>/<uuid>.part` while being counted and
//! sniffed. A [`ScratchFile`] removes itself when dropped unless it was moved into a
//! job directory with [`ScratchFile::persist_to`], so a rejected upload never leaves
//! bytes behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use roomscan_core::constants::{SCRATCH_SUFFIX, SNIFF_LEN};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

#[derive(Clone, Debug)]
pub struct ScratchArea {
    dir: PathBuf,
}

impl ScratchArea {
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create upload directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(ScratchArea { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a new scratch file.
    pub async fn create(&self) -> StorageResult<ScratchFile> {
        let path = self
            .dir
            .join(format!("{}{}", Uuid::new_v4(), SCRATCH_SUFFIX));
        let file = fs::File::create(&path).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;
        Ok(ScratchFile {
            path,
            file: Some(file),
            len: 0,
            head: Vec::with_capacity(SNIFF_LEN),
            persisted: false,
        })
    }

    /// Remove scratch entries. With `min_age`, entries modified more recently are kept.
    pub async fn clear(&self, min_age: Option<Duration>) -> StorageResult<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };

            if let Some(min_age) = min_age {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age < min_age {
                    continue;
                }
            }

            let result = if metadata.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch entry")
                }
            }
        }
        Ok(removed)
    }
}

/// An upload being streamed into the scratch area.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    file: Option<fs::File>,
    len: u64,
    head: Vec<u8>,
    persisted: bool,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Leading bytes of the upload, for content sniffing.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StorageError::WriteFailed("scratch file already closed".to_string()))?;
        file.write_all(chunk).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        if self.head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - self.head.len()).min(chunk.len());
            self.head.extend_from_slice(&chunk[..take]);
        }
        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Flush and move the upload to `dest`, falling back to copy when a rename is not
    /// possible (different filesystems).
    pub async fn persist_to(mut self, dest: &Path) -> StorageResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        if fs::rename(&self.path, dest).await.is_err() {
            fs::copy(&self.path, dest).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to move upload to {}: {}",
                    dest.display(),
                    e
                ))
            })?;
            let _ = fs::remove_file(&self.path).await;
        }

        self.persisted = true;
        Ok(())
    }

    /// Remove the scratch file now.
    pub async fn discard(mut self) {
        self.file.take();
        if let Err(e) = fs::remove_file(&self.path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
        self.persisted = true;
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.file.take();
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed rejected upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file")
            }
        }
    }
}
