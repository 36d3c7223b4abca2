use thiserror::Error;
use super::types::ItemId;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    /// 文件超过大小限制，在进入快照之前就被拒绝
    #[error("{name} is too large: {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge {
        name: String,
        size: u64,
        limit: u64,
    },

    #[error("File data is missing for {0}")]
    MissingPayload(String),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Engine shut down")]
    Shutdown,
}

impl SyncError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Validation errors are raised before anything is inserted into the snapshot.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::FileTooLarge { .. } | Self::MissingPayload(_))
    }
}

/// Error alias
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
