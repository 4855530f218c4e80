use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Files larger than this many bytes are uploaded in chunks.
pub const CHUNK_UPLOAD_THRESHOLD_SIZE: u64 = 1_024_000;

/// Size of a single chunk in a chunked upload.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_024_000;

pub const HUNDRED_PERCENT: u8 = 100;

/// Unique identifier of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum JobState {
    /// Submitted, waiting for a worker
    Pending,
    /// Looking up a free remote path
    Resolving,
    /// Transferring the file
    Uploading,
    /// Delivered and shared
    Succeeded,
    Failed,
    /// Stopped by the caller
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (Pending, Resolving) | (Resolving, Uploading) | (Uploading, Succeeded) => true,
            (Pending | Resolving | Uploading, Failed) => true,
            (Pending | Resolving | Uploading, Cancelled) => true,
            _ => false,
        }
    }
}

/// Final outcome of a job as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum JobResult {
    Succeeded,
    Failed,
    Cancelled,
}

impl From<JobResult> for JobState {
    fn from(result: JobResult) -> Self {
        match result {
            JobResult::Succeeded => JobState::Succeeded,
            JobResult::Failed => JobState::Failed,
            JobResult::Cancelled => JobState::Cancelled,
        }
    }
}

/// Transfer mode picked from the file size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadMode {
    /// One request carrying the whole body
    Simple,
    /// Sequential chunks over a transfer session
    Chunked,
}

impl UploadMode {
    pub fn for_size(file_size: u64, threshold: u64) -> Self {
        if file_size > threshold {
            UploadMode::Chunked
        } else {
            UploadMode::Simple
        }
    }
}

/// Inputs of an upload job, fixed at submission time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobRequest {
    /// `file://` URI or filesystem path; doubles as the dedup key
    pub source_file: String,
    /// Token of the target conversation
    pub conversation_id: String,
    pub conversation_name: String,
    /// Opaque blob forwarded with the share (e.g. a caption)
    pub metadata: Option<String>,
}

impl JobRequest {
    pub fn new(
        source_file: impl Into<String>,
        conversation_id: impl Into<String>,
        conversation_name: impl Into<String>,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            conversation_id: conversation_id.into(),
            conversation_name: conversation_name.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn dedup_key(&self) -> &str {
        &self.source_file
    }
}

/// Reply to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(JobId),
    /// A job with the same key is pending or running; nothing was queued
    Dropped { existing: JobId },
}

impl SubmitOutcome {
    pub fn accepted(&self) -> Option<JobId> {
        match self {
            SubmitOutcome::Accepted(id) => Some(*id),
            SubmitOutcome::Dropped { .. } => None,
        }
    }
}

/// Scheduler view of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub key: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
}

/// Scheduler events
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Accepted {
        id: JobId,
        key: String,
    },
    Dropped {
        key: String,
        existing: JobId,
    },
    Started {
        id: JobId,
    },
    Finished {
        id: JobId,
        result: JobResult,
    },
}
