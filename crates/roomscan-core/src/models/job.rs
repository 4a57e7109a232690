use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ScanMetadata;
use crate::error::AppError;
use crate::validation::is_valid_job_id;

/// Validated job identifier (lower-case hyphenated UUID v4).
///
/// Filesystem paths are only ever derived from a `JobId`, so holding one is proof the
/// value went through [`is_valid_job_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        JobId(Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        if is_valid_job_id(raw) {
            Ok(JobId(raw.to_string()))
        } else {
            Err(AppError::InvalidId(raw.chars().take(64).collect()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobId::parse(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JobId::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// The persisted per-job record (`info.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[schema(value_type = String, example = "0b6f4b8e-3c1a-4f5e-9d2a-7c8b9e0f1a2b")]
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    /// Stored input file name, present until the conversion attempt finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,
    /// Artifact file name, present only when `status == done`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default)]
    pub meta: ScanMetadata,
    /// Hex SHA-256 of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, meta: ScanMetadata, input_file: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            input_file: Some(input_file),
            output_file: None,
            meta,
            hash: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Relative URL of the artifact, only once the job is done.
    pub fn artifact_url(&self) -> Option<String> {
        (self.status == JobStatus::Done).then(|| format!("/api/scans/{}/room.glb", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_generate_is_valid() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), 36);
        assert!(JobId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_job_id_rejects_traversal() {
        assert!(JobId::parse("../etc/passwd").is_err());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("0B6F4B8E-3C1A-4F5E-9D2A-7C8B9E0F1A2B").is_err());
    }

    #[test]
    fn test_job_id_deserialize_validates() {
        let ok: Result<JobId, _> =
            serde_json::from_str("\"0b6f4b8e-3c1a-4f5e-9d2a-7c8b9e0f1a2b\"");
        assert!(ok.is_ok());
        let bad: Result<JobId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().ok(), Some(status));
        }
        assert!(JobStatus::Done.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = JobRecord::new(
            JobId::generate(),
            ScanMetadata::default(),
            "input.obj".to_string(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["progress"], 0);
        assert_eq!(json["inputFile"], "input.obj");
        assert!(json.get("outputFile").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_artifact_url_only_when_done() {
        let mut record = JobRecord::new(
            JobId::generate(),
            ScanMetadata::default(),
            "input.obj".to_string(),
        );
        assert!(record.artifact_url().is_none());
        record.status = JobStatus::Done;
        let url = record.artifact_url().unwrap();
        assert!(url.ends_with("/room.glb"));
        assert!(url.contains(record.id.as_str()));
    }
}
