pub mod config;
pub mod core;
pub mod notification;
pub mod remote;
pub mod uploaders;
pub mod utils;

pub use config::{Config, ServerConfig, UploadSettings};
pub use core::{
    JobId, JobRequest, JobResult, JobScheduler, JobState, ProgressEvent, ProgressSink, RemoteStore,
    Result, SubmitOutcome, UploadError, UploadJob, UploadScheduler,
};
pub use notification::{Notification, NotificationCenter};
pub use remote::NextcloudClient;

#[cfg(test)]
mod testing;
