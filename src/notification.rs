//! Notification bookkeeping for running uploads.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use tracing::debug;
use crate::core::{JobId, ProgressEvent, ProgressSink, HUNDRED_PERCENT};
use crate::utils::shorten_file_name;

pub const PROGRESS_TITLE: &str = "Uploading";
pub const FAILURE_TITLE: &str = "Upload failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Progress,
    Summary,
    Failure,
}

/// What a notification shade would currently show for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub job_id: Option<JobId>,
    pub title: String,
    pub text: String,
    pub ongoing: bool,
    pub percentage: Option<u8>,
}

impl Notification {
    fn progress(job_id: JobId, file_name: &str, conversation_name: &str, percentage: u8) -> Self {
        Self {
            kind: NotificationKind::Progress,
            job_id: Some(job_id),
            title: PROGRESS_TITLE.to_string(),
            text: format!("{} to {}: {}%", shorten_file_name(file_name), conversation_name, percentage),
            ongoing: true,
            percentage: Some(percentage),
        }
    }

    fn summary(active: usize) -> Self {
        Self {
            kind: NotificationKind::Summary,
            job_id: None,
            title: PROGRESS_TITLE.to_string(),
            text: match active {
                1 => "1 upload in progress".to_string(),
                n => format!("{} uploads in progress", n),
            },
            ongoing: true,
            percentage: None,
        }
    }

    fn failure(job_id: JobId, file_name: &str) -> Self {
        Self {
            kind: NotificationKind::Failure,
            job_id: Some(job_id),
            title: FAILURE_TITLE.to_string(),
            text: format!("Failed to upload {}", file_name),
            ongoing: false,
            percentage: None,
        }
    }
}

struct ActiveUpload {
    file_name: String,
    conversation_name: String,
    notification: Notification,
}

#[derive(Default)]
struct State {
    active: HashMap<JobId, ActiveUpload>,
    summary: Option<Notification>,
    failures: Vec<Notification>,
}

impl State {
    fn refresh_summary(&mut self) {
        self.summary = match self.active.len() {
            0 => None,
            n => Some(Notification::summary(n)),
        };
    }

    fn remove(&mut self, job_id: JobId) {
        if self.active.remove(&job_id).is_some() {
            self.refresh_summary();
        }
    }
}

/// [`ProgressSink`] that keeps one notification per running chunked
/// upload plus a group summary shared by all of them.
///
/// Jobs report from their own tasks, so all state sits behind one lock.
#[derive(Default)]
pub struct NotificationCenter {
    state: Mutex<State>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress notifications currently shown.
    pub fn active(&self) -> Vec<Notification> {
        let mut active: Vec<_> = self
            .lock()
            .active
            .values()
            .map(|upload| upload.notification.clone())
            .collect();
        active.sort_by(|a, b| a.text.cmp(&b.text));
        active
    }

    pub fn progress_for(&self, job_id: JobId) -> Option<Notification> {
        self.lock()
            .active
            .get(&job_id)
            .map(|upload| upload.notification.clone())
    }

    pub fn summary(&self) -> Option<Notification> {
        self.lock().summary.clone()
    }

    pub fn failures(&self) -> Vec<Notification> {
        self.lock().failures.clone()
    }

    pub fn dismiss_failures(&self) {
        self.lock().failures.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }
}

impl ProgressSink for NotificationCenter {
    fn on_event(&self, event: ProgressEvent) {
        let mut state = self.lock();
        match event {
            ProgressEvent::Started { job_id, file_name, conversation_name } => {
                let notification = Notification::progress(job_id, &file_name, &conversation_name, 0);
                state.active.insert(job_id, ActiveUpload {
                    file_name,
                    conversation_name,
                    notification,
                });
                state.refresh_summary();
            }
            ProgressEvent::Progress { job_id, percentage } => {
                let Some(upload) = state.active.get_mut(&job_id) else {
                    debug!("Progress for {} without a notification", job_id);
                    return;
                };
                let shown = upload.notification.percentage.unwrap_or(0);
                // Percentages only ever move forward on screen.
                if percentage > shown {
                    upload.notification = Notification::progress(
                        job_id,
                        &upload.file_name,
                        &upload.conversation_name,
                        percentage.min(HUNDRED_PERCENT),
                    );
                }
            }
            ProgressEvent::Succeeded { job_id } | ProgressEvent::Cancelled { job_id } => {
                state.remove(job_id);
            }
            ProgressEvent::Failed { job_id, file_name } => {
                state.remove(job_id);
                state.failures.push(Notification::failure(job_id, &file_name));
            }
        }
    }
}
