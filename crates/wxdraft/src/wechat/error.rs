use std::path::PathBuf;

use thiserror::Error;

/// `invalid media_id`: the referenced permanent material no longer exists.
pub const EXPIRED_MEDIA_ERRCODE: i64 = 40007;

#[derive(Error, Debug)]
pub enum WeChatError {
    /// Non-zero `errcode` in the response body, kept verbatim.
    #[error("WeChat API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    /// Connection failure or timeout.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    /// Rejected locally before anything was sent.
    #[error("Upload rejected: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl WeChatError {
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_expired_media(&self) -> bool {
        self.code() == Some(EXPIRED_MEDIA_ERRCODE)
    }
}

impl From<reqwest::Error> for WeChatError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs carry the access token.
        Self::Transport(e.without_url().to_string())
    }
}
