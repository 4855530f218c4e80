use std::fs;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use crate::core::{Result, UploadError, CHUNK_UPLOAD_THRESHOLD_SIZE, DEFAULT_CHUNK_SIZE};

fn default_timeout_secs() -> u64 {
    300
}

fn default_attachment_folder() -> String {
    "/Talk".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_threshold() -> u64 {
    CHUNK_UPLOAD_THRESHOLD_SIZE
}

fn default_max_concurrent() -> usize {
    3
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadSettings,
}

/// Account on the remote server
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub base_url: String,
    /// Id used in DAV paths
    pub user_id: String,
    /// Login name for basic auth
    pub username: String,
    pub app_password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Upload tuning handed to every job
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    /// Remote folder attachments are placed in
    #[serde(default = "default_attachment_folder")]
    pub attachment_folder: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Files strictly larger than this go through chunked upload
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            attachment_folder: default_attachment_folder(),
            chunk_size: default_chunk_size(),
            chunk_threshold: default_chunk_threshold(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .map_err(|err| UploadError::Config(format!("can't read {}: {}", path.display(), err)))?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)
            .map_err(|err| UploadError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.server.base_url).is_err() {
            return Err(UploadError::Config(format!("invalid base_url: {:?}", self.server.base_url)));
        }
        if self.server.user_id.trim().is_empty() {
            return Err(UploadError::Config("user_id must not be empty".to_string()));
        }
        if self.upload.chunk_size == 0 {
            return Err(UploadError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.upload.max_concurrent == 0 {
            return Err(UploadError::Config("max_concurrent must be greater than zero".to_string()));
        }
        Ok(())
    }
}
