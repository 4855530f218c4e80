use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use super::errors::Result;
use super::plan::ChunkInfo;

/// Server side handle grouping the chunks of one chunked upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferSession(pub String);

impl TransferSession {
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote file API used by the uploaders and the path resolver.
///
/// Remote paths are absolute within the user's files, e.g. `/Talk/photo.jpg`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether something already exists at `remote_path`.
    async fn exists(&self, remote_path: &str) -> Result<bool>;

    /// Single request upload of the whole file.
    async fn upload_file(
        &self,
        remote_path: &str,
        file: &Path,
        content_type: &str,
        size: u64,
    ) -> Result<()>;

    /// Opens a chunk assembly session.
    async fn open_session(&self) -> Result<TransferSession>;

    async fn upload_chunk(
        &self,
        session: &TransferSession,
        chunk: &ChunkInfo,
        data: Bytes,
        total_size: u64,
    ) -> Result<()>;

    /// Assembles the uploaded chunks into `remote_path`.
    async fn finalize_session(
        &self,
        session: &TransferSession,
        remote_path: &str,
        total_size: u64,
    ) -> Result<()>;

    /// Drops a session and any partially assembled data.
    async fn abort_session(&self, session: &TransferSession) -> Result<()>;

    /// Shares an uploaded file into a conversation.
    async fn share(
        &self,
        remote_path: &str,
        conversation_id: &str,
        metadata: Option<&str>,
    ) -> Result<()>;
}

/// Host capability check for reading local media
pub trait PermissionCheck: Send + Sync {
    fn can_read_local_media(&self) -> bool;
}

/// Permission check for hosts without a permission model
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl PermissionCheck for AlwaysGranted {
    fn can_read_local_media(&self) -> bool {
        true
    }
}
