use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::path::Path;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;
use uuid::Uuid;
use crate::config::ServerConfig;
use crate::core::{ChunkInfo, RemoteStore, Result, TransferSession, UploadError};

const OC_TOTAL_LENGTH: &str = "OC-Total-Length";
const SHARE_TYPE_ROOM: &str = "10";

fn dav_method(name: &'static [u8]) -> Result<Method> {
    Method::from_bytes(name).map_err(|err| UploadError::Network(err.to_string()))
}

/// WebDAV + OCS client for a Nextcloud-style server
#[derive(Debug, Clone)]
pub struct NextcloudClient {
    client: Client,
    base_url: Url,
    user_id: String,
    username: String,
    password: String,
}

impl NextcloudClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("talk-upload/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: &ServerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| UploadError::Config(format!("invalid base_url {:?}: {}", config.base_url, err)))?;

        Ok(Self {
            client,
            base_url,
            user_id: config.user_id.clone(),
            username: config.username.clone(),
            password: config.app_password.clone(),
        })
    }

    fn url_with<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UploadError::Config(format!("base_url can't be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{base}/remote.php/dav/files/{user}/{remote_path}`
    pub fn file_url(&self, remote_path: &str) -> Result<Url> {
        let segments = ["remote.php", "dav", "files", self.user_id.as_str()]
            .into_iter()
            .chain(remote_path.split('/').filter(|s| !s.is_empty()));
        self.url_with(segments)
    }

    /// `{base}/remote.php/dav/uploads/{user}/{session}`
    pub fn session_url(&self, session: &TransferSession) -> Result<Url> {
        self.url_with(["remote.php", "dav", "uploads", self.user_id.as_str(), session.id()])
    }

    fn chunk_url(&self, session: &TransferSession, chunk: &ChunkInfo) -> Result<Url> {
        let name = format!("{:015}-{:015}", chunk.offset, chunk.end());
        self.url_with([
            "remote.php",
            "dav",
            "uploads",
            self.user_id.as_str(),
            session.id(),
            name.as_str(),
        ])
    }

    fn share_url(&self) -> Result<Url> {
        self.url_with(["ocs", "v2.php", "apps", "files_sharing", "api", "v1", "shares"])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn expect_success(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(UploadError::server_error(
            status.as_u16(),
            format!("{} failed: {}", what, body.trim()),
        ))
    }
}

#[async_trait]
impl RemoteStore for NextcloudClient {
    async fn exists(&self, remote_path: &str) -> Result<bool> {
        let url = self.file_url(remote_path)?;
        debug!("HEAD {}", url);

        let response = self.request(Method::HEAD, url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(UploadError::server_error(
                status.as_u16(),
                format!("existence check for {} failed", remote_path),
            )),
        }
    }

    async fn upload_file(
        &self,
        remote_path: &str,
        file: &Path,
        content_type: &str,
        size: u64,
    ) -> Result<()> {
        let url = self.file_url(remote_path)?;
        debug!("PUT {} ({} bytes)", url, size);

        let file = File::open(file).await?;
        let body = Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, content_type)
            .header(OC_TOTAL_LENGTH, size)
            .body(body)
            .send()
            .await?;

        Self::expect_success(response, "upload").await?;
        Ok(())
    }

    async fn open_session(&self) -> Result<TransferSession> {
        let session = TransferSession(format!("talk-upload-{}", Uuid::new_v4()));
        let url = self.session_url(&session)?;
        debug!("MKCOL {}", url);

        let response = self.request(dav_method(b"MKCOL")?, url).send().await?;
        Self::expect_success(response, "create upload session").await?;
        Ok(session)
    }

    async fn upload_chunk(
        &self,
        session: &TransferSession,
        chunk: &ChunkInfo,
        data: Bytes,
        total_size: u64,
    ) -> Result<()> {
        let url = self.chunk_url(session, chunk)?;
        debug!("PUT chunk {} -> {}", chunk.index, url);

        let response = self
            .request(Method::PUT, url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(OC_TOTAL_LENGTH, total_size)
            .body(data)
            .send()
            .await?;

        Self::expect_success(response, &format!("chunk {}", chunk.index)).await?;
        Ok(())
    }

    async fn finalize_session(
        &self,
        session: &TransferSession,
        remote_path: &str,
        total_size: u64,
    ) -> Result<()> {
        let mut source = self.session_url(session)?;
        source
            .path_segments_mut()
            .map_err(|_| UploadError::Config("session url can't be a base".to_string()))?
            .push(".file");
        let destination = self.file_url(remote_path)?;
        debug!("MOVE {} -> {}", source, destination);

        let mut headers = HeaderMap::new();
        headers.insert(
            "Destination",
            HeaderValue::from_str(destination.as_str())
                .map_err(|err| UploadError::SessionFinalize(err.to_string()))?,
        );
        headers.insert("Overwrite", HeaderValue::from_static("F"));
        headers.insert(OC_TOTAL_LENGTH, HeaderValue::from(total_size));

        let response = self
            .request(dav_method(b"MOVE")?, source)
            .headers(headers)
            .send()
            .await?;

        Self::expect_success(response, "assemble chunks").await?;
        Ok(())
    }

    async fn abort_session(&self, session: &TransferSession) -> Result<()> {
        let url = self.session_url(session)?;
        debug!("DELETE {}", url);

        let response = self.request(Method::DELETE, url).send().await?;
        Self::expect_success(response, "delete upload session").await?;
        Ok(())
    }

    async fn share(
        &self,
        remote_path: &str,
        conversation_id: &str,
        metadata: Option<&str>,
    ) -> Result<()> {
        let url = self.share_url()?;
        debug!("Sharing {} with conversation {}", remote_path, conversation_id);

        let mut form = vec![
            ("shareType", SHARE_TYPE_ROOM),
            ("shareWith", conversation_id),
            ("path", remote_path),
        ];
        if let Some(metadata) = metadata {
            form.push(("talkMetaData", metadata));
        }

        let response = self
            .request(Method::POST, url)
            .header("OCS-APIRequest", "true")
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let response = Self::expect_success(response, "share").await?;
        let body = response.text().await.unwrap_or_default();
        check_ocs_status(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OcsEnvelope {
    ocs: OcsBody,
}

#[derive(Debug, Deserialize)]
struct OcsBody {
    meta: OcsMeta,
}

#[derive(Debug, Deserialize)]
struct OcsMeta {
    statuscode: u16,
    #[serde(default)]
    message: Option<String>,
}

/// OCS may report a failure inside a 2xx response. Bodies that are not an
/// OCS envelope are accepted as-is.
fn check_ocs_status(body: &str) -> Result<()> {
    let Ok(envelope) = serde_json::from_str::<OcsEnvelope>(body) else {
        return Ok(());
    };
    match envelope.ocs.meta.statuscode {
        100 | 200 => Ok(()),
        code => Err(UploadError::server_error(
            code,
            format!("share failed: {}", envelope.ocs.meta.message.unwrap_or_default()),
        )),
    }
}
