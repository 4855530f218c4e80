use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Remote path resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("IO read error: {0}")]
    IoRead(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Session finalize failed: {0}")]
    SessionFinalize(String),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scheduler shutdown")]
    Shutdown,
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Transport level failures: connection problems and non-success responses.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_) | Self::Server { .. })
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(UploadError::Cancelled.is_cancelled());
        assert!(UploadError::server_error(500, "boom").is_network());
        assert!(UploadError::network("reset").is_network());
        assert!(!UploadError::validation("empty").is_network());
        assert!(!UploadError::SessionFinalize("move".into()).is_cancelled());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: UploadError = io.into();
        assert!(matches!(err, UploadError::IoRead(_)));
        assert_eq!(err.to_string(), "IO read error: gone");
    }
}
