use bytes::Bytes;
use std::path::Path;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::core::{ChunkInfo, ChunkPlan, RemoteStore, Result, TransferSession, UploadError};
use crate::utils::format_bytes;

/// Receives the rounded upload percentage after every delivered chunk.
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Uploads a file as an ordered sequence of chunks over one transfer session.
///
/// Chunks go out one at a time in index order. [`ChunkedUploader::abort_upload`]
/// never interrupts a chunk in flight: the loop checks the cancel flag before
/// each chunk and before assembling, and stops there.
pub struct ChunkedUploader {
    store: Arc<dyn RemoteStore>,
    chunk_size: u64,
    conversation_id: String,
    metadata: Option<String>,
    cancel: CancellationToken,
    on_progress: Option<ProgressCallback>,
    /// Session opened by the running upload, taken by whoever cleans it up.
    session: Mutex<Option<TransferSession>>,
}

impl ChunkedUploader {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        chunk_size: u64,
        conversation_id: impl Into<String>,
        metadata: Option<String>,
    ) -> Self {
        Self {
            store,
            chunk_size,
            conversation_id: conversation_id.into(),
            metadata,
            cancel: CancellationToken::new(),
            on_progress: None,
            session: Mutex::new(None),
        }
    }

    /// Uses `token` as the cancel flag, so cancelling it stops the upload
    /// at the next chunk boundary.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub async fn upload(&self, file: &Path, content_type: &str, remote_path: &str) -> Result<()> {
        let mut source = File::open(file).await?;
        let total_size = source.metadata().await?.len();
        let plan = ChunkPlan::new(total_size, self.chunk_size);
        if plan.is_empty() {
            return Err(UploadError::validation("empty files are not uploaded in chunks"));
        }

        info!(
            "Chunked upload of {} ({}, {}) in {} chunks",
            remote_path,
            format_bytes(total_size),
            content_type,
            plan.len()
        );

        self.check_cancelled().await?;
        let session = self.store.open_session().await?;
        *self.session_slot() = Some(session.clone());
        debug!("Opened transfer session {}", session);

        let started = Instant::now();
        let mut transferred = 0u64;
        let mut last_reported = 0u8;

        for chunk in plan.chunks() {
            self.check_cancelled().await?;

            let data = read_chunk(&mut source, chunk).await?;
            self.store
                .upload_chunk(&session, chunk, data, total_size)
                .await?;

            transferred += chunk.length;
            let percentage = plan.percentage(transferred).max(last_reported);
            last_reported = percentage;
            debug!(
                "Chunk {}/{} done ({}%)",
                chunk.index + 1,
                plan.len(),
                percentage
            );
            if let Some(callback) = &self.on_progress {
                callback(percentage);
            }
        }

        self.check_cancelled().await?;
        self.store
            .finalize_session(&session, remote_path, total_size)
            .await
            .map_err(|err| UploadError::SessionFinalize(err.to_string()))?;
        self.session_slot().take();

        info!(
            "Assembled {} in {:.1}s",
            remote_path,
            started.elapsed().as_secs_f64()
        );

        self.store
            .share(remote_path, &self.conversation_id, self.metadata.as_deref())
            .await
    }

    /// Stops the upload before its next chunk and deletes the remote session.
    ///
    /// `on_complete` runs once cleanup was attempted, whether or not it worked.
    pub async fn abort_upload<F>(&self, on_complete: F)
    where
        F: FnOnce() + Send,
    {
        self.cancel.cancel();
        self.cleanup_session().await;
        on_complete();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.cleanup_session().await;
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }

    async fn cleanup_session(&self) {
        let session = self.session_slot().take();
        if let Some(session) = session {
            match self.store.abort_session(&session).await {
                Ok(()) => info!("Deleted transfer session {}", session),
                Err(err) => warn!("Failed to delete transfer session {}: {}", session, err),
            }
        }
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<TransferSession>> {
        self.session.lock()
    }
}

async fn read_chunk(file: &mut File, chunk: &ChunkInfo) -> Result<Bytes> {
    file.seek(std::io::SeekFrom::Start(chunk.offset)).await?;
    let mut buffer = vec![0u8; chunk.length as usize];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_file, Call, MockStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CHUNK: u64 = 1_000;

    fn collect_progress(uploader: ChunkedUploader) -> (ChunkedUploader, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let uploader = uploader.with_progress(move |pct| sink.lock().unwrap().push(pct));
        (uploader, seen)
    }

    #[tokio::test]
    async fn test_sequential_chunks_then_finalize() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "video.mp4", 3_500);
        let store = Arc::new(MockStore::new());
        let (uploader, seen) = collect_progress(ChunkedUploader::new(store.clone(), CHUNK, "room", None));

        uploader.upload(&file, "video/mp4", "/Talk/video.mp4").await.unwrap();

        assert_eq!(store.chunk_indices(), vec![0, 1, 2, 3]);
        assert_eq!(*seen.lock().unwrap(), vec![29, 57, 86, 100]);

        let calls = store.calls();
        let received: Vec<usize> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Chunk { received, .. } => Some(*received),
                _ => None,
            })
            .collect();
        assert_eq!(received, vec![1_000, 1_000, 1_000, 500]);

        let finalize_pos = calls.iter().position(|c| matches!(c, Call::Finalize { .. })).unwrap();
        let last_chunk_pos = calls.iter().rposition(|c| matches!(c, Call::Chunk { .. })).unwrap();
        assert!(finalize_pos > last_chunk_pos);
        assert_eq!(store.count(|c| matches!(c, Call::Finalize { total_size: 3_500, .. })), 1);
        assert_eq!(store.count(|c| matches!(c, Call::Share { .. })), 1);
        assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 0);
    }

    #[tokio::test]
    async fn test_every_chunk_uses_the_opened_session() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.bin", 2_500);
        let store = Arc::new(MockStore::new());
        let uploader = ChunkedUploader::new(store.clone(), CHUNK, "room", None);

        uploader.upload(&file, "application/octet-stream", "/Talk/a.bin").await.unwrap();

        let calls = store.calls();
        let opened = match &calls[0] {
            Call::OpenSession(session) => session.clone(),
            other => panic!("expected session first, got {:?}", other),
        };
        for call in &calls {
            match call {
                Call::Chunk { session, .. } | Call::Finalize { session, .. } => {
                    assert_eq!(session, &opened)
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_stops_transfer() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.bin", 3_500);
        let store = Arc::new(MockStore::new().fail_chunk(1));
        let (uploader, seen) = collect_progress(ChunkedUploader::new(store.clone(), CHUNK, "room", None));

        let result = uploader.upload(&file, "application/octet-stream", "/Talk/a.bin").await;

        assert!(result.unwrap_err().is_network());
        assert_eq!(store.chunk_indices(), vec![0, 1]);
        assert_eq!(*seen.lock().unwrap(), vec![29]);
        assert_eq!(store.count(|c| matches!(c, Call::Finalize { .. })), 0);
        assert_eq!(store.count(|c| matches!(c, Call::Share { .. })), 0);
    }

    #[tokio::test]
    async fn test_finalize_failure_is_not_delivered() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.bin", 2_000);
        let store = Arc::new(MockStore::new().fail_finalize());
        let uploader = ChunkedUploader::new(store.clone(), CHUNK, "room", None);

        let result = uploader.upload(&file, "application/octet-stream", "/Talk/a.bin").await;

        assert!(matches!(result, Err(UploadError::SessionFinalize(_))));
        assert_eq!(store.count(|c| matches!(c, Call::Share { .. })), 0);
    }

    #[tokio::test]
    async fn test_abort_between_chunks() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.bin", 3_500);
        let store = Arc::new(MockStore::new().pause_on_chunk(0));
        let uploader = Arc::new(ChunkedUploader::new(store.clone(), CHUNK, "room", None));

        let handle = tokio::spawn({
            let uploader = uploader.clone();
            async move { uploader.upload(&file, "application/octet-stream", "/Talk/a.bin").await }
        });

        store.wait_paused().await;
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        uploader
            .abort_upload(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        store.release();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(UploadError::Cancelled)));
        assert!(uploader.is_aborted());
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(store.chunk_indices(), vec![0]);
        assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 1);
        assert_eq!(store.count(|c| matches!(c, Call::Finalize { .. })), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_before_start_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.bin", 3_500);
        let store = Arc::new(MockStore::new());
        let token = CancellationToken::new();
        token.cancel();
        let uploader = ChunkedUploader::new(store.clone(), CHUNK, "room", None).with_cancel_token(token);

        let result = uploader.upload(&file, "application/octet-stream", "/Talk/a.bin").await;

        assert!(matches!(result, Err(UploadError::Cancelled)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_abort_without_session_still_completes() {
        let store = Arc::new(MockStore::new());
        let uploader = ChunkedUploader::new(store.clone(), CHUNK, "room", None);
        let mut done = false;

        uploader.abort_upload(|| done = true).await;

        assert!(done);
        assert_eq!(store.count(|c| matches!(c, Call::Abort(_))), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_failure() {
        let store = Arc::new(MockStore::new());
        let uploader = ChunkedUploader::new(store.clone(), CHUNK, "room", None);

        let result = uploader
            .upload(Path::new("/nonexistent/file.bin"), "application/octet-stream", "/Talk/x")
            .await;

        assert!(matches!(result, Err(UploadError::IoRead(_))));
        assert!(store.calls().is_empty());
    }
}
