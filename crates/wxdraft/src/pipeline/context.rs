use std::path::PathBuf;

use crate::markdown::{ArticleMetadata, ImageWarning};

/// An uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Reads a file from disk, keeping only its file name.
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, content })
    }
}

/// Input of `StartProcessing`.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub markdown: UploadedFile,
    pub cover: UploadedFile,
    pub content_images: Vec<UploadedFile>,
}

/// Result of `StartProcessing`.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub job_id: String,
    pub preview_url: String,
    pub warnings: Vec<ImageWarning>,
}

/// Result of `ConfirmAndPublish`.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub job_id: String,
    pub media_id: String,
    /// The thumbnail was re-uploaded after an expired-media rejection.
    pub thumbnail_refreshed: bool,
}

/// State carried between the steps of `StartProcessing`.
pub struct ProcessingContext {
    pub job_id: String,

    // Relative to the media root
    pub markdown_path: Option<String>,
    pub cover_path: Option<String>,

    pub optimized_cover: Option<PathBuf>,
    pub thumb_media_id: Option<String>,
    /// Token fetched for the cover upload, reused for content images.
    pub access_token: Option<String>,

    pub metadata: Option<ArticleMetadata>,
    pub body: Option<String>,
    pub html: Option<String>,
    pub preview_path: Option<String>,

    // Non-fatal
    pub warnings: Vec<ImageWarning>,
}

impl ProcessingContext {
    pub fn new(job_id: String) -> Self {
        Self {
            job_id,
            markdown_path: None,
            cover_path: None,
            optimized_cover: None,
            thumb_media_id: None,
            access_token: None,
            metadata: None,
            body: None,
            html: None,
            preview_path: None,
            warnings: Vec::new(),
        }
    }
}
