//! In-memory doubles for the remote store and the progress sink.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;
use parking_lot::Mutex;
use tokio::sync::Notify;
use crate::core::{
    ChunkInfo, JobId, ProgressEvent, ProgressSink, RemoteStore, Result, TransferSession,
    UploadError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    UploadFile {
        path: String,
        content_type: String,
        size: u64,
    },
    OpenSession(TransferSession),
    Chunk {
        session: TransferSession,
        chunk: ChunkInfo,
        received: usize,
    },
    Finalize {
        session: TransferSession,
        path: String,
        total_size: u64,
    },
    Abort(TransferSession),
    Share {
        path: String,
        conversation_id: String,
        metadata: Option<String>,
    },
}

#[derive(Default)]
pub struct MockStore {
    existing: HashSet<String>,
    fail_exists: bool,
    fail_upload: bool,
    fail_chunk: Option<usize>,
    fail_finalize: bool,
    fail_share: bool,
    pause_on_chunk: Option<usize>,
    pause_upload: bool,
    pause_share: bool,
    calls: Mutex<Vec<Call>>,
    paused: Notify,
    release: Notify,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing<'a>(mut self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        self.existing.extend(paths.into_iter().map(String::from));
        self
    }

    pub fn fail_exists(mut self) -> Self {
        self.fail_exists = true;
        self
    }

    pub fn fail_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn fail_chunk(mut self, index: usize) -> Self {
        self.fail_chunk = Some(index);
        self
    }

    pub fn fail_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    pub fn fail_share(mut self) -> Self {
        self.fail_share = true;
        self
    }

    /// Holds the given chunk in flight until [`MockStore::release`].
    pub fn pause_on_chunk(mut self, index: usize) -> Self {
        self.pause_on_chunk = Some(index);
        self
    }

    /// Holds single request uploads in flight until [`MockStore::release`].
    pub fn pause_upload(mut self) -> Self {
        self.pause_upload = true;
        self
    }

    /// Holds the share request in flight until [`MockStore::release`].
    pub fn pause_share(mut self) -> Self {
        self.pause_share = true;
        self
    }

    pub async fn wait_paused(&self) {
        self.paused.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn exists_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Exists(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn chunk_indices(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Chunk { chunk, .. } => Some(chunk.index),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    async fn hold(&self) {
        self.paused.notify_one();
        self.release.notified().await;
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn exists(&self, remote_path: &str) -> Result<bool> {
        self.record(Call::Exists(remote_path.to_string()));
        if self.fail_exists {
            return Err(UploadError::server_error(401, "unauthorized"));
        }
        Ok(self.existing.contains(remote_path))
    }

    async fn upload_file(
        &self,
        remote_path: &str,
        file: &Path,
        content_type: &str,
        size: u64,
    ) -> Result<()> {
        tokio::fs::metadata(file).await?;
        self.record(Call::UploadFile {
            path: remote_path.to_string(),
            content_type: content_type.to_string(),
            size,
        });
        if self.pause_upload {
            self.hold().await;
        }
        if self.fail_upload {
            return Err(UploadError::network("connection reset"));
        }
        Ok(())
    }

    async fn open_session(&self) -> Result<TransferSession> {
        let session = TransferSession(format!("session-{}", JobId::new()));
        self.record(Call::OpenSession(session.clone()));
        Ok(session)
    }

    async fn upload_chunk(
        &self,
        session: &TransferSession,
        chunk: &ChunkInfo,
        data: Bytes,
        _total_size: u64,
    ) -> Result<()> {
        self.record(Call::Chunk {
            session: session.clone(),
            chunk: *chunk,
            received: data.len(),
        });
        if self.pause_on_chunk == Some(chunk.index) {
            self.hold().await;
        }
        if self.fail_chunk == Some(chunk.index) {
            return Err(UploadError::server_error(503, "unavailable"));
        }
        Ok(())
    }

    async fn finalize_session(
        &self,
        session: &TransferSession,
        remote_path: &str,
        total_size: u64,
    ) -> Result<()> {
        self.record(Call::Finalize {
            session: session.clone(),
            path: remote_path.to_string(),
            total_size,
        });
        if self.fail_finalize {
            return Err(UploadError::server_error(500, "assembly failed"));
        }
        Ok(())
    }

    async fn abort_session(&self, session: &TransferSession) -> Result<()> {
        self.record(Call::Abort(session.clone()));
        Ok(())
    }

    async fn share(
        &self,
        remote_path: &str,
        conversation_id: &str,
        metadata: Option<&str>,
    ) -> Result<()> {
        self.record(Call::Share {
            path: remote_path.to_string(),
            conversation_id: conversation_id.to_string(),
            metadata: metadata.map(String::from),
        });
        if self.pause_share {
            self.hold().await;
        }
        if self.fail_share {
            return Err(UploadError::server_error(404, "conversation not found"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn percentages(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress { percentage, .. } => Some(percentage),
                _ => None,
            })
            .collect()
    }

    pub fn has_failure(&self) -> bool {
        self.events()
            .iter()
            .any(|event| matches!(event, ProgressEvent::Failed { .. }))
    }
}

impl ProgressSink for RecordingSink {
    fn on_event(&self, event: ProgressEvent) {
        self.events.lock().push(event);
    }
}

/// Writes `size` bytes of a repeating pattern into `dir/name`.
pub fn write_file(dir: &Path, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}
