mod errors;
mod job;
mod plan;
mod progress;
mod scheduler;
mod store;
mod traits;
mod types;
mod worker;

pub use errors::{Result, UploadError};
pub use job::{LocalSource, UploadJob};
pub use plan::{ChunkInfo, ChunkPlan};
pub use progress::{ChannelSink, ProgressEvent, ProgressSink, TracingSink};
pub use scheduler::{JobScheduler, UploadScheduler};
pub use traits::{AlwaysGranted, PermissionCheck, RemoteStore, TransferSession};
pub use types::{
    JobId, JobRequest, JobResult, JobSnapshot, JobState, SchedulerEvent, SubmitOutcome,
    UploadMode, CHUNK_UPLOAD_THRESHOLD_SIZE, DEFAULT_CHUNK_SIZE, HUNDRED_PERCENT,
};
