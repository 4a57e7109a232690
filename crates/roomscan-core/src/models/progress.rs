use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{JobId, JobRecord, JobStatus};

/// A progress update pushed to live subscribers of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProgressEvent {
    #[schema(value_type = String)]
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<&JobRecord> for ProgressEvent {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            progress: record.progress,
        }
    }
}
