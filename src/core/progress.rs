use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use super::types::JobId;

/// Snapshot of a job lifecycle change handed to a [`ProgressSink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    Started {
        job_id: JobId,
        file_name: String,
        conversation_name: String,
    },
    Progress {
        job_id: JobId,
        percentage: u8,
    },
    Succeeded {
        job_id: JobId,
    },
    Failed {
        job_id: JobId,
        file_name: String,
    },
    Cancelled {
        job_id: JobId,
    },
}

impl ProgressEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            ProgressEvent::Started { job_id, .. }
            | ProgressEvent::Progress { job_id, .. }
            | ProgressEvent::Succeeded { job_id }
            | ProgressEvent::Failed { job_id, .. }
            | ProgressEvent::Cancelled { job_id } => *job_id,
        }
    }
}

/// Receiver of job progress, implemented by the UI layer.
///
/// Calls are fire-and-forget. Several jobs may call the same sink from
/// different workers, so implementations synchronize their own state.
/// The `on_*` methods wrap their arguments in a [`ProgressEvent`] and hand
/// it to [`ProgressSink::on_event`].
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);

    fn on_started(&self, job_id: JobId, file_name: &str, conversation_name: &str) {
        self.on_event(ProgressEvent::Started {
            job_id,
            file_name: file_name.to_string(),
            conversation_name: conversation_name.to_string(),
        });
    }

    fn on_progress(&self, job_id: JobId, percentage: u8) {
        self.on_event(ProgressEvent::Progress {
            job_id,
            percentage: percentage.min(100),
        });
    }

    fn on_succeeded(&self, job_id: JobId) {
        self.on_event(ProgressEvent::Succeeded { job_id });
    }

    fn on_failed(&self, job_id: JobId, file_name: &str) {
        self.on_event(ProgressEvent::Failed {
            job_id,
            file_name: file_name.to_string(),
        });
    }

    fn on_cancelled(&self, job_id: JobId) {
        self.on_event(ProgressEvent::Cancelled { job_id });
    }
}

/// Forwards events into a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: ProgressEvent) {
        // Receiver gone means nobody is watching anymore.
        let _ = self.tx.send(event);
    }
}

/// Logs every event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id, file_name, conversation_name } => {
                info!(%job_id, "Uploading {} to {}", file_name, conversation_name);
            }
            ProgressEvent::Progress { job_id, percentage } => {
                info!(%job_id, "Upload at {}%", percentage);
            }
            ProgressEvent::Succeeded { job_id } => info!(%job_id, "Upload finished"),
            ProgressEvent::Failed { job_id, file_name } => {
                error!(%job_id, "Failed to upload {}", file_name);
            }
            ProgressEvent::Cancelled { job_id } => info!(%job_id, "Upload cancelled"),
        }
    }
}
