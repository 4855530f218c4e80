use parking_lot::{Mutex, MutexGuard};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;
use crate::config::UploadSettings;
use crate::remote::{join_remote_path, RemotePathResolver};
use crate::uploaders::{ChunkedUploader, SimpleUploader};
use crate::utils::format_bytes;
use super::errors::{Result, UploadError};
use super::progress::ProgressSink;
use super::traits::{AlwaysGranted, PermissionCheck, RemoteStore};
use super::types::{JobId, JobRequest, JobResult, JobState, UploadMode};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Local file behind a job's source reference
#[derive(Debug, Clone)]
pub struct LocalSource {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
}

/// One file upload into a conversation.
///
/// Inputs are fixed at creation; only the state moves, along
/// `Pending -> Resolving -> Uploading -> Succeeded`, or to `Failed` /
/// `Cancelled` from any non-terminal state. Every error is turned into a
/// [`JobResult`] here, nothing escapes [`UploadJob::run`].
pub struct UploadJob {
    id: JobId,
    request: JobRequest,
    settings: UploadSettings,
    store: Arc<dyn RemoteStore>,
    sink: Arc<dyn ProgressSink>,
    permissions: Arc<dyn PermissionCheck>,
    history: Mutex<Vec<JobState>>,
    file_name: OnceLock<String>,
}

impl UploadJob {
    pub fn new(request: JobRequest, store: Arc<dyn RemoteStore>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            id: JobId::new(),
            request,
            settings: UploadSettings::default(),
            store,
            sink,
            permissions: Arc::new(AlwaysGranted),
            history: Mutex::new(vec![JobState::Pending]),
            file_name: OnceLock::new(),
        }
    }

    pub fn with_settings(mut self, settings: UploadSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionCheck>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    pub fn dedup_key(&self) -> &str {
        self.request.dedup_key()
    }

    pub fn state(&self) -> JobState {
        self.history_guard().last().copied().unwrap_or(JobState::Pending)
    }

    /// Every state the job went through, oldest first.
    pub fn history(&self) -> Vec<JobState> {
        self.history_guard().clone()
    }

    pub async fn run(&self, cancel: CancellationToken) -> JobResult {
        let span = info_span!("upload_job", job_id = %self.id);
        self.run_inner(cancel).instrument(span).await
    }

    /// Finishes a job that was stopped before it ever ran.
    pub(crate) fn cancel_unstarted(&self) {
        self.transition(JobState::Cancelled);
        self.sink.on_cancelled(self.id);
    }

    async fn run_inner(&self, cancel: CancellationToken) -> JobResult {
        if !self.permissions.can_read_local_media() {
            warn!(
                "Storage permission is not granted. Callers should request it before \
                 submitting uploads; if they did, the user most likely revoked it"
            );
        }

        match self.execute(&cancel).await {
            Ok(()) => {
                info!("Uploaded {}", self.display_name());
                self.transition(JobState::Succeeded);
                self.sink.on_succeeded(self.id);
                JobResult::Succeeded
            }
            Err(err) if err.is_cancelled() || cancel.is_cancelled() => {
                info!("Upload of {} cancelled ({})", self.display_name(), err);
                self.transition(JobState::Cancelled);
                self.sink.on_cancelled(self.id);
                JobResult::Cancelled
            }
            Err(err) => {
                error!(
                    retryable = err.is_network(),
                    "Something went wrong when trying to upload {}: {}",
                    self.display_name(),
                    err
                );
                self.transition(JobState::Failed);
                self.sink.on_failed(self.id, &self.display_name());
                JobResult::Failed
            }
        }
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        let source = self.validate().await?;
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        self.transition(JobState::Resolving);
        let resolver = RemotePathResolver::new(self.store.clone());
        let candidate = join_remote_path(&self.settings.attachment_folder, &source.file_name);
        let remote_path = tokio::select! {
            resolved = resolver.resolve(&candidate) => resolved?,
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        };

        self.transition(JobState::Uploading);
        match UploadMode::for_size(source.size, self.settings.chunk_threshold) {
            UploadMode::Simple => {
                debug!("Starting normal upload (not chunked) of {}", source.file_name);
                SimpleUploader::new(
                    self.store.clone(),
                    self.request.conversation_id.clone(),
                    self.request.metadata.clone(),
                )
                .upload(&source.path, source.size, &source.content_type, &remote_path, cancel)
                .await
            }
            UploadMode::Chunked => {
                debug!("Starting chunked upload because size is {}", format_bytes(source.size));
                self.upload_chunked(&source, &remote_path, cancel).await
            }
        }
    }

    async fn upload_chunked(
        &self,
        source: &LocalSource,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.sink
            .on_started(self.id, &source.file_name, &self.request.conversation_name);

        let sink = self.sink.clone();
        let job_id = self.id;
        let uploader = ChunkedUploader::new(
            self.store.clone(),
            self.settings.chunk_size,
            self.request.conversation_id.clone(),
            self.request.metadata.clone(),
        )
        .with_cancel_token(cancel.child_token())
        .with_progress(move |percentage| sink.on_progress(job_id, percentage));

        let upload = uploader.upload(&source.path, &source.content_type, remote_path);
        tokio::pin!(upload);

        tokio::select! {
            result = &mut upload => result,
            _ = cancel.cancelled() => {
                info!("Stop requested, aborting chunked upload of {}", source.file_name);
                uploader
                    .abort_upload(|| debug!("Transfer session cleanup attempted"))
                    .await;
                // The chunk in flight finishes on its own; the loop then sees the flag.
                upload.await
            }
        }
    }

    /// Checks inputs before any network call.
    async fn validate(&self) -> Result<LocalSource> {
        if self.request.conversation_id.trim().is_empty() {
            return Err(UploadError::validation("conversation id is missing"));
        }

        let path = source_path(&self.request.source_file)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| UploadError::validation(format!("{}: {}", path.display(), err)))?;
        if !metadata.is_file() {
            return Err(UploadError::validation(format!("{} is not a file", path.display())));
        }
        tokio::fs::File::open(&path)
            .await
            .map_err(|err| UploadError::validation(format!("{} is not readable: {}", path.display(), err)))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::validation(format!("{} has no file name", path.display())))?;
        let _ = self.file_name.set(file_name.clone());

        let content_type = mime_guess::from_path(&path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(LocalSource {
            path,
            file_name,
            size: metadata.len(),
            content_type,
        })
    }

    fn display_name(&self) -> String {
        match self.file_name.get() {
            Some(name) => name.clone(),
            None => self
                .request
                .source_file
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(&self.request.source_file)
                .to_string(),
        }
    }

    fn transition(&self, next: JobState) {
        let mut history = self.history_guard();
        let current = history.last().copied().unwrap_or(JobState::Pending);
        if current.can_transition_to(next) {
            debug!("{:?} -> {:?}", current, next);
            history.push(next);
        } else {
            warn!("Ignoring invalid state change {:?} -> {:?}", current, next);
        }
    }

    fn history_guard(&self) -> MutexGuard<'_, Vec<JobState>> {
        self.history.lock()
    }
}

/// Accepts `file://` URIs and plain paths.
fn source_path(source: &str) -> Result<PathBuf> {
    let source = source.trim();
    if source.is_empty() {
        return Err(UploadError::validation("source file is empty"));
    }

    if source.contains("://") {
        let url = Url::parse(source)
            .map_err(|err| UploadError::validation(format!("invalid source uri {:?}: {}", source, err)))?;
        if url.scheme() != "file" {
            return Err(UploadError::validation(format!("unsupported source scheme {:?}", url.scheme())));
        }
        return url
            .to_file_path()
            .map_err(|_| UploadError::validation(format!("source uri {:?} is not a local path", source)));
    }

    Ok(PathBuf::from(source))
}
