use std::sync::Arc;
use tracing::{debug, info};
use crate::core::{RemoteStore, Result, UploadError};

/// Gives up after this many numbered candidates.
const MAX_ATTEMPTS: u32 = 1000;

/// Finds a remote path nothing occupies yet.
///
/// A free candidate is returned unchanged. An occupied `/dir/name.ext` becomes
/// `/dir/name (2).ext`, `/dir/name (3).ext`, and so on. Someone else may still
/// create the same name between resolution and upload; that shows up as an
/// upload failure.
pub struct RemotePathResolver {
    store: Arc<dyn RemoteStore>,
}

impl RemotePathResolver {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, candidate: &str) -> Result<String> {
        if !self.is_taken(candidate).await? {
            return Ok(candidate.to_string());
        }

        for count in 2..MAX_ATTEMPTS + 2 {
            let path = numbered_path(candidate, count);
            if !self.is_taken(&path).await? {
                info!("{} already exists, using {}", candidate, path);
                return Ok(path);
            }
        }

        Err(UploadError::ResolutionFailed(format!(
            "no free name for {} after {} attempts",
            candidate, MAX_ATTEMPTS
        )))
    }

    async fn is_taken(&self, path: &str) -> Result<bool> {
        let taken = self
            .store
            .exists(path)
            .await
            .map_err(|err| UploadError::ResolutionFailed(format!("{}: {}", path, err)))?;
        debug!("{} taken: {}", path, taken);
        Ok(taken)
    }
}

/// Joins folder and file name with exactly one slash between them.
pub fn join_remote_path(folder: &str, file_name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    let file_name = file_name.trim_start_matches('/');
    if folder.is_empty() {
        format!("/{}", file_name)
    } else if folder.starts_with('/') {
        format!("{}/{}", folder, file_name)
    } else {
        format!("/{}/{}", folder, file_name)
    }
}

/// `/a/b.tar.gz` with 2 gives `/a/b.tar (2).gz`; dot files and names
/// without an extension get the suffix appended.
fn numbered_path(path: &str, count: u32) -> String {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let suffix = format!(" ({})", count);

    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}{}{}", &path[..dot], suffix, &path[dot..])
        }
        _ => format!("{}{}", path, suffix),
    }
}
