use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::core::{RemoteStore, Result, UploadError};

/// Uploads a file in one request, then shares it into the conversation.
///
/// Either the whole file is delivered or nothing is; there is no progress
/// below file granularity and no retry.
pub struct SimpleUploader {
    store: Arc<dyn RemoteStore>,
    conversation_id: String,
    metadata: Option<String>,
}

impl SimpleUploader {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        conversation_id: impl Into<String>,
        metadata: Option<String>,
    ) -> Self {
        Self {
            store,
            conversation_id: conversation_id.into(),
            metadata,
        }
    }

    /// Stopping `cancel` while the file is in flight drops the request and
    /// yields [`UploadError::Cancelled`]. Once the file is stored the share
    /// always goes out, so nothing is left on the server unshared.
    pub async fn upload(
        &self,
        file: &Path,
        size: u64,
        content_type: &str,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        tokio::select! {
            result = self.store.upload_file(remote_path, file, content_type, size) => result?,
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        }

        debug!("Uploaded {}, sharing with {}", remote_path, self.conversation_id);
        self.store
            .share(remote_path, &self.conversation_id, self.metadata.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_file, Call, MockStore};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_then_share() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "note.txt", 64);
        let store = Arc::new(MockStore::new());
        let uploader = SimpleUploader::new(store.clone(), "room1", Some("{\"caption\":\"hi\"}".into()));

        uploader
            .upload(&file, 64, "text/plain", "/Talk/note.txt", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![
                Call::UploadFile {
                    path: "/Talk/note.txt".into(),
                    content_type: "text/plain".into(),
                    size: 64,
                },
                Call::Share {
                    path: "/Talk/note.txt".into(),
                    conversation_id: "room1".into(),
                    metadata: Some("{\"caption\":\"hi\"}".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_failure_skips_share() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "note.txt", 8);
        let store = Arc::new(MockStore::new().fail_upload());
        let uploader = SimpleUploader::new(store.clone(), "room1", None);

        let result = uploader
            .upload(&file, 8, "text/plain", "/Talk/note.txt", &CancellationToken::new())
            .await;

        assert!(result.unwrap_err().is_network());
        assert_eq!(store.count(|c| matches!(c, Call::Share { .. })), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_request() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "note.txt", 8);
        let store = Arc::new(MockStore::new().pause_upload());
        let uploader = Arc::new(SimpleUploader::new(store.clone(), "room1", None));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let uploader = uploader.clone();
            let cancel = cancel.clone();
            async move {
                uploader
                    .upload(&file, 8, "text/plain", "/Talk/note.txt", &cancel)
                    .await
            }
        });

        store.wait_paused().await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(UploadError::Cancelled)));
        assert_eq!(store.count(|c| matches!(c, Call::Share { .. })), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_share_still_shares() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "note.txt", 8);
        let store = Arc::new(MockStore::new().pause_share());
        let uploader = Arc::new(SimpleUploader::new(store.clone(), "room1", None));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let uploader = uploader.clone();
            let cancel = cancel.clone();
            async move {
                uploader
                    .upload(&file, 8, "text/plain", "/Talk/note.txt", &cancel)
                    .await
            }
        });

        store.wait_paused().await;
        cancel.cancel();
        store.release();

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(store.count(|c| matches!(c, Call::Share { .. })), 1);
    }
}
