use chrono::{DateTime, Utc};

use crate::db::DatabaseError;
use crate::job::{JobStatus, PublishingJob};
use crate::markdown::ArticleMetadata;

/// Partial update of a job. `None` leaves a field untouched; for clearable
/// fields `Some(None)` writes NULL.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub original_markdown_path: Option<String>,
    pub original_cover_image_path: Option<String>,
    pub metadata: Option<ArticleMetadata>,
    pub thumb_media_id: Option<String>,
    pub preview_path: Option<String>,
    pub wechat_media_id: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(Some(message.into())),
            ..Default::default()
        }
    }

    pub fn with_thumb_media_id(mut self, media_id: impl Into<String>) -> Self {
        self.thumb_media_id = Some(media_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ArticleMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_preview_path(mut self, path: impl Into<String>) -> Self {
        self.preview_path = Some(path.into());
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.original_markdown_path.is_none()
            && self.original_cover_image_path.is_none()
            && self.metadata.is_none()
            && self.thumb_media_id.is_none()
            && self.preview_path.is_none()
            && self.wechat_media_id.is_none()
            && self.error_message.is_none()
            && self.published_at.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Record store for publishing jobs.
pub trait JobStore: Send + Sync {
    /// Creates a job in `status` and returns its new id.
    fn create(&self, status: JobStatus) -> Result<String, DatabaseError>;

    fn load(&self, id: &str) -> Result<Option<PublishingJob>, DatabaseError>;

    /// Applies a partial update. Fails with `JobNotFound` for unknown ids.
    fn save_fields(&self, id: &str, update: &JobUpdate) -> Result<(), DatabaseError>;

    /// Most recent first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<PublishingJob>, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_builders() {
        let update = JobUpdate::status(JobStatus::PreviewReady)
            .with_preview_path("previews/a.html")
            .clear_error();
        assert_eq!(update.status, Some(JobStatus::PreviewReady));
        assert_eq!(update.preview_path.as_deref(), Some("previews/a.html"));
        assert_eq!(update.error_message, Some(None));
        assert!(!update.is_empty());

        let failed = JobUpdate::failed("boom");
        assert_eq!(failed.status, Some(JobStatus::Failed));
        assert_eq!(failed.error_message, Some(Some("boom".to_string())));

        assert!(JobUpdate::default().is_empty());
    }
}
