//! The publishing job aggregate and its store interface.

pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::markdown::ArticleMetadata;

pub use store::{JobFilter, JobStore, JobUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    PreviewReady,
    Publishing,
    Published,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::PreviewReady => "PREVIEW_READY",
            Self::Publishing => "PUBLISHING",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "PREVIEW_READY" => Ok(Self::PreviewReady),
            "PUBLISHING" => Ok(Self::Publishing),
            "PUBLISHED" => Ok(Self::Published),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// One Markdown article on its way to becoming a WeChat draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingJob {
    pub id: String,
    pub status: JobStatus,
    pub original_markdown_path: Option<String>,
    pub original_cover_image_path: Option<String>,
    pub metadata: ArticleMetadata,
    pub thumb_media_id: Option<String>,
    pub preview_path: Option<String>,
    pub wechat_media_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl PublishingJob {
    pub fn thumb_media_id(&self) -> Option<&str> {
        self.thumb_media_id.as_deref().filter(|s| !s.is_empty())
    }
}
