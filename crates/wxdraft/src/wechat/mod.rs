//! WeChat Official Account API access.

pub mod client;
pub mod error;
pub mod types;

use std::path::Path;

use async_trait::async_trait;

pub use client::{WeChatClient, WeChatClientConfig};
pub use error::{WeChatError, EXPIRED_MEDIA_ERRCODE};
pub use types::{DraftArticle, DraftPayload};

/// The remote operations the publishing pipeline depends on.
///
/// None of these retry internally; token refresh is the only implicit
/// remote call.
#[async_trait]
pub trait WeChatApi: Send + Sync {
    /// Returns a cached token, fetching a new one when close to expiry.
    async fn access_token(&self) -> Result<String, WeChatError>;

    /// Drops the cached token so the next call fetches a fresh one.
    async fn invalidate_token(&self);

    /// Uploads permanent thumbnail material and returns its media id.
    async fn upload_thumbnail(&self, token: &str, path: &Path) -> Result<String, WeChatError>;

    /// Uploads an in-article image and returns its URL.
    async fn upload_content_image(&self, token: &str, path: &Path) -> Result<String, WeChatError>;

    /// Creates a draft and returns its media id.
    async fn submit_draft(&self, token: &str, payload: &DraftPayload) -> Result<String, WeChatError>;
}
