//! Filesystem job store
//!
//! One directory per job under a canonicalized root. Directory paths are only ever
//! built from a validated [`JobId`], and every resolved path is checked to stay
//! inside the root before it is touched.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use roomscan_core::constants::{INFO_FILENAME, INPUT_STEM, INTERRUPTED_REASON, OUTPUT_FILENAME};
use roomscan_core::{JobId, JobRecord, JobStatus};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::hash::sha256_file;

/// Passes over a job directory before a delete gives up on concurrent writers.
const DELETE_ATTEMPTS: u32 = 3;

/// Artifact file facts needed for conditional retrieval.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Hex SHA-256 of the artifact.
    pub hash: String,
    pub record: JobRecord,
}

/// Raw bytes of a job record plus its modification time.
#[derive(Debug, Clone)]
pub struct InfoSnapshot {
    pub bytes: Vec<u8>,
    pub modified: SystemTime,
}

#[derive(Clone, Debug)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Open (and create if needed) the storage root.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = fs::canonicalize(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to canonicalize storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(JobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a job. Does not touch the filesystem.
    pub fn job_dir(&self, id: &JobId) -> StorageResult<PathBuf> {
        let dir = self.root.join(id.as_str());
        if dir.parent() != Some(self.root.as_path()) {
            return Err(StorageError::InvalidPath(
                "Job directory resolves outside storage root".to_string(),
            ));
        }
        Ok(dir)
    }

    /// Directory of an existing job, following symlinks and re-checking containment.
    async fn existing_job_dir(&self, id: &JobId) -> StorageResult<PathBuf> {
        let dir = self.job_dir(id)?;
        let canonical = match fs::canonicalize(&dir).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if canonical.strip_prefix(&self.root).is_err() {
            return Err(StorageError::InvalidPath(
                "Job directory resolves outside storage root".to_string(),
            ));
        }
        Ok(dir)
    }

    pub fn artifact_path(&self, id: &JobId) -> StorageResult<PathBuf> {
        Ok(self.job_dir(id)?.join(OUTPUT_FILENAME))
    }

    /// Path of the stored input. `file_name` must be a bare `input.<ext>` name.
    pub fn input_path(&self, id: &JobId, file_name: &str) -> StorageResult<PathBuf> {
        let is_plain = Path::new(file_name).file_name().and_then(|n| n.to_str()) == Some(file_name);
        if !is_plain || !file_name.starts_with(&format!("{}.", INPUT_STEM)) {
            return Err(StorageError::InvalidPath(format!(
                "Invalid input file name: {}",
                file_name
            )));
        }
        Ok(self.job_dir(id)?.join(file_name))
    }

    /// Create the job directory and write its initial record.
    ///
    /// Fails with `AlreadyExists` if the directory is already present.
    #[tracing::instrument(skip(self, record), fields(job_id = %record.id))]
    pub async fn create(&self, record: &JobRecord) -> StorageResult<PathBuf> {
        let dir = self.job_dir(&record.id)?;
        fs::create_dir(&dir).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => StorageError::AlreadyExists(record.id.to_string()),
            _ => StorageError::WriteFailed(format!(
                "Failed to create job directory {}: {}",
                dir.display(),
                e
            )),
        })?;
        self.write_record(&dir, record).await?;
        Ok(dir)
    }

    /// Persist a record for a job whose directory still exists.
    pub async fn save(&self, record: &JobRecord) -> StorageResult<()> {
        let dir = self.existing_job_dir(&record.id).await?;
        self.write_record(&dir, record).await
    }

    async fn write_record(&self, dir: &Path, record: &JobRecord) -> StorageResult<()> {
        let start = Instant::now();
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| StorageError::WriteFailed(format!("Failed to encode record: {}", e)))?;

        let target = dir.join(INFO_FILENAME);
        let tmp = dir.join(format!(".{}.{}.tmp", INFO_FILENAME, Uuid::new_v4().simple()));

        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &target).await
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to write {}: {}",
                target.display(),
                e
            )));
        }

        tracing::debug!(
            job_id = %record.id,
            status = %record.status,
            progress = record.progress,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Job record written"
        );

        Ok(())
    }

    pub async fn load(&self, id: &JobId) -> StorageResult<JobRecord> {
        let snapshot = self.read_info(id).await?;
        serde_json::from_slice(&snapshot.bytes)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", id, e)))
    }

    /// Raw record bytes and mtime, for the info endpoint.
    pub async fn read_info(&self, id: &JobId) -> StorageResult<InfoSnapshot> {
        let path = self.existing_job_dir(id).await?.join(INFO_FILENAME);
        let bytes = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(id.to_string()),
            _ => StorageError::ReadFailed(format!("Failed to read {}: {}", path.display(), e)),
        })?;
        let modified = fs::metadata(&path).await?.modified()?;
        Ok(InfoSnapshot { bytes, modified })
    }

    pub async fn exists(&self, id: &JobId) -> bool {
        self.existing_job_dir(id).await.is_ok()
    }

    /// Ids of every job directory, in lexicographic order.
    pub async fn list_ids(&self) -> StorageResult<Vec<JobId>> {
        Ok(self
            .list_with_mtime()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Job directories with their last-modified times, sorted by id.
    ///
    /// Entries whose names are not job ids are ignored.
    pub async fn list_with_mtime(&self) -> StorageResult<Vec<(JobId, SystemTime)>> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to list {}: {}", self.root.display(), e))
        })?;

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(id) = JobId::parse(&name) else {
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_dir() => m,
                _ => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            jobs.push((id, modified));
        }

        jobs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(jobs)
    }

    /// Remove a job's entire directory.
    #[tracing::instrument(skip(self), fields(job_id = %id))]
    pub async fn delete(&self, id: &JobId) -> StorageResult<()> {
        let dir = self.existing_job_dir(id).await?;
        let mut attempt = 1;
        loop {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Another delete finished the tree after our first pass.
                    if attempt == 1 {
                        return Err(StorageError::NotFound(id.to_string()));
                    }
                    break;
                }
                // A concurrent record save can drop a file in while the tree is removed.
                Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty && attempt < DELETE_ATTEMPTS => {
                    tracing::debug!(job_id = %id, attempt = attempt, "Job directory refilled during delete, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StorageError::DeleteFailed(format!(
                        "Failed to remove {}: {}",
                        dir.display(),
                        e
                    )))
                }
            }
        }
        tracing::info!(job_id = %id, "Job directory removed");
        Ok(())
    }

    /// Delete the stored input of a record, if any. Missing files are not an error.
    pub async fn remove_input(&self, record: &JobRecord) -> StorageResult<()> {
        let Some(name) = record.input_file.as_deref() else {
            return Ok(());
        };
        let path = self.input_path(&record.id, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Artifact facts for a finished job. The hash is computed and persisted on first use
    /// when the record does not carry one yet.
    pub async fn artifact(&self, id: &JobId) -> StorageResult<ArtifactInfo> {
        let mut record = self.load(id).await?;
        if record.status != JobStatus::Done {
            return Err(StorageError::NotFound(format!("{} has no artifact yet", id)));
        }

        let path = self.artifact_path(id)?;
        let metadata = fs::metadata(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("{} artifact missing", id)),
            _ => StorageError::ReadFailed(format!("Failed to stat {}: {}", path.display(), e)),
        })?;

        let hash = match record.hash.clone() {
            Some(hash) => hash,
            None => {
                let hash = sha256_file(&path).await?;
                record.hash = Some(hash.clone());
                if let Err(e) = self.save(&record).await {
                    tracing::warn!(job_id = %id, error = %e, "Failed to persist artifact hash");
                }
                hash
            }
        };

        Ok(ArtifactInfo {
            path,
            size: metadata.len(),
            modified: metadata.modified()?,
            hash,
            record,
        })
    }

    /// Mark jobs left unfinished by a previous process as failed and drop their inputs.
    pub async fn recover_interrupted(&self) -> StorageResult<usize> {
        let mut recovered = 0;
        for id in self.list_ids().await? {
            let mut record = match self.load(&id).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Skipping unreadable job record");
                    continue;
                }
            };
            if record.status.is_terminal() {
                continue;
            }

            if let Err(e) = self.remove_input(&record).await {
                tracing::warn!(job_id = %id, error = %e, "Failed to remove interrupted input");
            }
            record.status = JobStatus::Error;
            record.progress = 100;
            record.input_file = None;
            record.error = Some(INTERRUPTED_REASON.to_string());
            record.touch();
            self.save(&record).await?;
            recovered += 1;
        }

        if recovered > 0 {
            tracing::warn!(count = recovered, "Marked interrupted jobs as failed");
        }
        Ok(recovered)
    }
}
