//! Uploads local images referenced from an article body.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::hashing::ContentHasher;
use crate::markdown::{ImageResolver, ImageWarning};
use crate::media_cache::{ContentImageResult, MediaCache};
use crate::processor::{ImageOptimizer, ImageTarget};
use crate::sanitize::redact_path;
use crate::storage::{sanitize_filename, BlobStorage};
use crate::wechat::WeChatApi;

/// Where a job's images may live, relative to the storage root.
#[derive(Debug, Clone)]
pub struct ImageLocations {
    /// Directory of the stored Markdown file; relative references start here.
    pub markdown_dir: String,
    /// `<content_images_dir>/<job_id>`
    pub job_images_dir: String,
    /// Shared content image directory, searched by file name last.
    pub shared_images_dir: String,
}

/// Resolves image references for one job: find the file, shrink it to the
/// content image limits, then reuse a cached upload or upload it.
pub struct ContentImageResolver {
    storage: Arc<dyn BlobStorage>,
    wechat: Arc<dyn WeChatApi>,
    cache: MediaCache,
    optimizer: ImageOptimizer,
    hasher: ContentHasher,
    token: String,
    locations: ImageLocations,
}

impl ContentImageResolver {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        wechat: Arc<dyn WeChatApi>,
        cache: MediaCache,
        token: String,
        locations: ImageLocations,
    ) -> Self {
        Self {
            storage,
            wechat,
            cache,
            optimizer: ImageOptimizer::new(),
            hasher: ContentHasher::new(),
            token,
            locations,
        }
    }

    /// Finds the file for `reference`. Candidates, in order: the reference
    /// relative to the Markdown file, the job's upload folder, the shared
    /// folder. The last two are matched by file name only.
    pub fn locate(&self, reference: &str) -> Option<PathBuf> {
        let reference = reference.trim().replace("%20", " ");

        if let Some(path) = self.relative_to_markdown(&reference) {
            return Some(path);
        }

        // Uploads are stored under their sanitized name; try that too.
        let file_name = Path::new(&reference).file_name()?.to_str()?;
        let stored_name = sanitize_filename(file_name);
        let names = [file_name, stored_name.as_str()];

        [&self.locations.job_images_dir, &self.locations.shared_images_dir]
            .into_iter()
            .flat_map(|dir| {
                names
                    .iter()
                    .map(move |name| format!("{}/{}", dir.trim_end_matches('/'), name))
            })
            .find(|rel| self.storage.exists(rel))
            .and_then(|rel| self.storage.absolute_path(&rel).ok())
    }

    fn relative_to_markdown(&self, reference: &str) -> Option<PathBuf> {
        let rel = Path::new(reference);
        if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::Prefix(_))) {
            return None;
        }

        let root = self.storage.root().canonicalize().ok()?;
        let candidate = self
            .storage
            .root()
            .join(&self.locations.markdown_dir)
            .join(rel)
            .canonicalize()
            .ok()?;

        (candidate.starts_with(&root) && candidate.is_file()).then_some(candidate)
    }

    async fn upload(&self, path: &Path, digest: Option<&str>) -> Result<String, String> {
        match self.wechat.upload_content_image(&self.token, path).await {
            Ok(url) => {
                if let Some(digest) = digest {
                    self.cache.put_content_image(
                        digest,
                        ContentImageResult::Uploaded { url: url.clone() },
                    );
                }
                Ok(url)
            }
            Err(e) => {
                let reason = format!("upload failed: {}", e);
                if let Some(digest) = digest {
                    self.cache.put_content_image(
                        digest,
                        ContentImageResult::Failed {
                            reason: reason.clone(),
                        },
                    );
                }
                Err(reason)
            }
        }
    }
}

#[async_trait]
impl ImageResolver for ContentImageResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ImageWarning> {
        let warn = |reason: String| ImageWarning {
            reference: reference.to_string(),
            reason,
        };

        let source = self
            .locate(reference)
            .ok_or_else(|| warn("file not found among uploaded images".to_string()))?;

        let optimized = self
            .optimizer
            .optimize(&source, &ImageTarget::content_image())
            .map_err(|e| warn(e.to_string()))?;

        let digest = self.hasher.hash(&optimized);
        if let Some(ref digest) = digest {
            match self.cache.get_content_image(digest) {
                Some(ContentImageResult::Uploaded { url }) => {
                    debug!(image = %redact_path(&source), "content image cache hit");
                    return Ok(url);
                }
                Some(ContentImageResult::Failed { reason }) => {
                    return Err(warn(format!("{} (cached)", reason)));
                }
                None => {}
            }
        }

        self.upload(&optimized, digest.as_deref()).await.map_err(warn)
    }
}
