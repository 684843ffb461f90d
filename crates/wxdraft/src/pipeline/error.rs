use thiserror::Error;

use crate::db::DatabaseError;
use crate::error::{ConfigError, ProcessError, StorageError};
use crate::wechat::WeChatError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The job is not in a state that allows the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Error reported by WeChat, code and message verbatim.
    #[error("WeChat API error {code}: {message}")]
    RemoteApi { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessError),

    #[error("Job store failed: {0}")]
    Database(DatabaseError),
}

/// Coarse error category, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    Conflict,
    RemoteApi,
    Transport,
    Storage,
    Processing,
    Database,
}

impl ErrorKind {
    /// Status code an HTTP front end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RemoteApi | Self::Transport => 502,
            Self::Configuration | Self::Storage | Self::Processing | Self::Database => 500,
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RemoteApi { .. } => ErrorKind::RemoteApi,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Processing(_) => ErrorKind::Processing,
            Self::Database(_) => ErrorKind::Database,
        }
    }

    /// The WeChat `errcode`, when the failure came from the API.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::RemoteApi { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<WeChatError> for PipelineError {
    fn from(e: WeChatError) -> Self {
        match e {
            WeChatError::Api { code, message } => Self::RemoteApi { code, message },
            WeChatError::HttpStatus { .. }
            | WeChatError::Transport(_)
            | WeChatError::InvalidResponse { .. } => Self::Transport(e.to_string()),
            WeChatError::Validation(msg) => Self::Validation(msg),
            WeChatError::FileNotFound(path) => Self::NotFound(format!(
                "file {}",
                crate::sanitize::redact_path(&path)
            )),
            WeChatError::Config(msg) => Self::Configuration(msg),
        }
    }
}

impl From<DatabaseError> for PipelineError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::JobNotFound(id) => Self::NotFound(format!("job {}", id)),
            other => Self::Database(other),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}
