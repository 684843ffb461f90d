use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::hashing::ContentHasher;
use crate::job::{JobStatus, JobStore, JobUpdate};
use crate::markdown::{build_preview_document, parse_document, MarkdownRenderer};
use crate::media_cache::MediaCache;
use crate::processor::{ImageOptimizer, ImageTarget};
use crate::resolver::{ContentImageResolver, ImageLocations};
use crate::sanitize::{self, redact_path};
use crate::storage::{sanitize_filename, BlobStorage, FileStorage};
use crate::wechat::{WeChatApi, WeChatClient};

use super::config::{wechat_client_config, PipelineConfig};
use super::context::{ProcessingContext, ProcessingOutcome, ProcessingRequest, UploadedFile};
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter, PublishPhase};

const PREVIEW_DIR: &str = "previews";

/// Drives jobs from uploaded files to a WeChat draft.
pub struct Pipeline {
    pub(super) config: Arc<PipelineConfig>,
    pub(super) jobs: Arc<dyn JobStore>,
    pub(super) storage: Arc<dyn BlobStorage>,
    pub(super) wechat: Arc<dyn WeChatApi>,
    pub(super) cache: MediaCache,
    pub(super) optimizer: ImageOptimizer,
    pub(super) hasher: ContentHasher,
}

impl Pipeline {
    /// Production constructor: SQLite job store, filesystem storage and the
    /// HTTP WeChat client, all from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let client = WeChatClient::new(wechat_client_config(config)?)?;
        let pipeline_config = PipelineConfig::from_config(config);

        let database = Database::open(&pipeline_config.database_path)?;
        let storage = FileStorage::new(&pipeline_config.media_root);
        let cache = match pipeline_config.cache_persist_path {
            Some(ref path) => MediaCache::load(path, pipeline_config.cache_ttl),
            None => MediaCache::new(pipeline_config.cache_ttl),
        };

        Ok(Self::new(
            Arc::new(pipeline_config),
            Arc::new(database),
            Arc::new(storage),
            Arc::new(client),
            cache,
        ))
    }

    /// Assembles a pipeline from explicit collaborators.
    pub fn new(
        config: Arc<PipelineConfig>,
        jobs: Arc<dyn JobStore>,
        storage: Arc<dyn BlobStorage>,
        wechat: Arc<dyn WeChatApi>,
        cache: MediaCache,
    ) -> Self {
        Self {
            config,
            jobs,
            storage,
            wechat,
            cache,
            optimizer: ImageOptimizer::new(),
            hasher: ContentHasher::new(),
        }
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.jobs.as_ref()
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    /// Creates a job from uploaded files and renders its preview.
    ///
    /// On success the job is `PREVIEW_READY`. On any failure after the job
    /// was created it is `FAILED` with the error message stored.
    pub async fn start_processing(
        &self,
        request: ProcessingRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let job_id = self.jobs.create(JobStatus::Pending)?;
        let span = info_span!("start_processing", job_id = %job_id);

        async {
            let mut ctx = ProcessingContext::new(job_id.clone());
            match self.run_processing(&mut ctx, request, progress).await {
                Ok(preview_path) => {
                    let preview_url = self.config.preview_url(&preview_path);
                    info!(
                        warnings = ctx.warnings.len(),
                        cache = ?self.cache.stats(),
                        "preview ready"
                    );
                    self.cache.persist();
                    progress.report(ProgressEvent::Completed {
                        job_id: job_id.clone(),
                        result: preview_url.clone(),
                    });
                    Ok(ProcessingOutcome {
                        job_id: job_id.clone(),
                        preview_url,
                        warnings: ctx.warnings,
                    })
                }
                Err(e) => {
                    self.fail_job(&job_id, &e, progress);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_processing(
        &self,
        ctx: &mut ProcessingContext,
        request: ProcessingRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<String, PipelineError> {
        self.jobs
            .save_fields(&ctx.job_id, &JobUpdate::status(JobStatus::Processing))?;

        // Step 1: Save uploads
        self.phase(ctx, progress, PublishPhase::SavingUploads, "Saving uploaded files...");
        {
            let _step = info_span!("save_uploads").entered();
            self.step_save_uploads(ctx, &request)?;
        }

        // Step 2: Optimize cover
        self.phase(ctx, progress, PublishPhase::OptimizingCover, "Optimizing cover image...");
        {
            let _step = info_span!("optimize_cover").entered();
            self.step_optimize_cover(ctx)?;
        }

        // Step 3: Thumbnail upload (cached)
        self.phase(ctx, progress, PublishPhase::UploadingCover, "Uploading cover thumbnail...");
        self.step_resolve_thumbnail(ctx)
            .instrument(info_span!("resolve_thumbnail"))
            .await?;

        // Step 4: Frontmatter
        self.phase(ctx, progress, PublishPhase::ParsingMarkdown, "Reading article metadata...");
        {
            let _step = info_span!("parse_markdown").entered();
            self.step_parse_markdown(ctx)?;
        }

        // Step 5: Render, uploading content images
        self.phase(ctx, progress, PublishPhase::Rendering, "Rendering Markdown...");
        self.step_render(ctx)
            .instrument(info_span!("render"))
            .await?;

        // Step 6: Preview document
        self.phase(ctx, progress, PublishPhase::WritingPreview, "Writing preview...");
        let preview_path = {
            let _step = info_span!("write_preview").entered();
            self.step_write_preview(ctx)?
        };

        self.jobs.save_fields(
            &ctx.job_id,
            &JobUpdate::status(JobStatus::PreviewReady)
                .with_preview_path(preview_path.clone())
                .clear_error(),
        )?;
        Ok(preview_path)
    }

    fn step_save_uploads(
        &self,
        ctx: &mut ProcessingContext,
        request: &ProcessingRequest,
    ) -> Result<(), PipelineError> {
        if request.markdown.content.is_empty() {
            return Err(PipelineError::Validation("Markdown file is empty".to_string()));
        }
        if request.cover.content.is_empty() {
            return Err(PipelineError::Validation("cover image is empty".to_string()));
        }

        let uploads = &self.config.uploads;
        let markdown_path = self.storage.save_uploaded_file(
            &request.markdown.content,
            &unique_name(&request.markdown, "md"),
            &uploads.markdown_dir,
        )?;
        let cover_path = self.storage.save_uploaded_file(
            &request.cover.content,
            &unique_name(&request.cover, "jpg"),
            &uploads.cover_dir,
        )?;

        let job_images_dir = job_images_dir(&uploads.content_images_dir, &ctx.job_id);
        for image in &request.content_images {
            let stored = self.storage.save_uploaded_file(
                &image.content,
                &image.name,
                &job_images_dir,
            )?;
            debug!(image = %stored, "content image saved");
        }

        self.jobs.save_fields(
            &ctx.job_id,
            &JobUpdate {
                original_markdown_path: Some(markdown_path.clone()),
                original_cover_image_path: Some(cover_path.clone()),
                ..Default::default()
            },
        )?;

        info!(
            content_images = request.content_images.len(),
            "uploads saved"
        );
        ctx.markdown_path = Some(markdown_path);
        ctx.cover_path = Some(cover_path);
        Ok(())
    }

    fn step_optimize_cover(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let cover = ctx
            .cover_path
            .as_deref()
            .ok_or_else(|| PipelineError::Validation("cover image was not saved".to_string()))?;
        let source = self.storage.absolute_path(cover)?;
        let optimized = self.optimizer.optimize(&source, &ImageTarget::thumbnail())?;
        ctx.optimized_cover = Some(optimized);
        Ok(())
    }

    async fn step_resolve_thumbnail(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let cover = ctx
            .optimized_cover
            .clone()
            .ok_or_else(|| PipelineError::Validation("cover image was not optimized".to_string()))?;

        let token = self.wechat.access_token().await?;
        let media_id = self.thumbnail_media_id(&cover, &token).await?;

        self.jobs.save_fields(
            &ctx.job_id,
            &JobUpdate::default().with_thumb_media_id(media_id.clone()),
        )?;
        ctx.thumb_media_id = Some(media_id);
        ctx.access_token = Some(token);
        Ok(())
    }

    /// Cached thumbnail id for `cover`, uploading on a miss. An unhashable
    /// file is uploaded without touching the cache.
    async fn thumbnail_media_id(&self, cover: &Path, token: &str) -> Result<String, PipelineError> {
        let digest = self.hasher.hash(cover);
        if let Some(media_id) = digest.as_deref().and_then(|d| self.cache.get_thumb(d)) {
            debug!(cover = %redact_path(cover), "thumbnail cache hit");
            return Ok(media_id);
        }

        let media_id = self.wechat.upload_thumbnail(token, cover).await?;
        if let Some(ref digest) = digest {
            self.cache.put_thumb(digest, &media_id);
        }
        info!(cover = %redact_path(cover), "thumbnail uploaded");
        Ok(media_id)
    }

    fn step_parse_markdown(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let markdown_path = ctx
            .markdown_path
            .as_deref()
            .ok_or_else(|| PipelineError::Validation("Markdown file was not saved".to_string()))?;
        let bytes = self.storage.read_file(markdown_path)?;
        let content = String::from_utf8(bytes).map_err(crate::error::ProcessError::from)?;

        let document =
            parse_document(&content).map_err(|e| PipelineError::Validation(e.to_string()))?;
        let title = document
            .metadata
            .require_title()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        debug!(title = %title, "metadata parsed");

        self.jobs.save_fields(
            &ctx.job_id,
            &JobUpdate::default().with_metadata(document.metadata.clone()),
        )?;
        ctx.metadata = Some(document.metadata);
        ctx.body = Some(document.body);
        Ok(())
    }

    async fn step_render(&self, ctx: &mut ProcessingContext) -> Result<(), PipelineError> {
        let body = ctx.body.as_deref().unwrap_or_default();
        let token = match ctx.access_token.clone() {
            Some(token) => token,
            None => self.wechat.access_token().await?,
        };

        let markdown_dir = ctx
            .markdown_path
            .as_deref()
            .and_then(|p| Path::new(p).parent())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let locations = ImageLocations {
            markdown_dir,
            job_images_dir: job_images_dir(&self.config.uploads.content_images_dir, &ctx.job_id),
            shared_images_dir: self.config.uploads.content_images_dir.clone(),
        };

        let resolver = ContentImageResolver::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.wechat),
            self.cache.clone(),
            token,
            locations,
        );
        let rendered = MarkdownRenderer::new(resolver).render(body).await;

        for warning in &rendered.warnings {
            warn!(%warning, "content image skipped");
        }
        ctx.warnings.extend(rendered.warnings);
        ctx.html = Some(rendered.html);
        Ok(())
    }

    fn step_write_preview(&self, ctx: &mut ProcessingContext) -> Result<String, PipelineError> {
        let css = match self.config.css_path {
            Some(ref path) => Some(std::fs::read_to_string(path).map_err(|e| {
                PipelineError::Configuration(format!(
                    "preview CSS '{}' is not readable: {}",
                    sanitize::redact_path(path),
                    e
                ))
            })?),
            None => None,
        };

        let title = ctx
            .metadata
            .as_ref()
            .and_then(|m| m.title())
            .unwrap_or_default();
        let document =
            build_preview_document(title, ctx.html.as_deref().unwrap_or_default(), css.as_deref());

        let preview_path = format!("{}/{}.html", PREVIEW_DIR, ctx.job_id);
        self.storage.write_file(&preview_path, document.as_bytes())?;
        ctx.preview_path = Some(preview_path.clone());
        Ok(preview_path)
    }

    fn phase(
        &self,
        ctx: &ProcessingContext,
        progress: &dyn ProgressReporter,
        phase: PublishPhase,
        message: &str,
    ) {
        progress.report(ProgressEvent::Phase {
            job_id: ctx.job_id.clone(),
            phase,
            message: message.to_string(),
        });
    }

    /// Records `error` on the job. A store failure here is only logged so the
    /// original error reaches the caller.
    pub(super) fn fail_job(
        &self,
        job_id: &str,
        error: &PipelineError,
        progress: &dyn ProgressReporter,
    ) {
        let message = error.to_string();
        warn!(
            job_id = %job_id,
            kind = ?error.kind(),
            status = error.kind().http_status(),
            remote_code = ?error.remote_code(),
            error = %message,
            "job failed"
        );
        if let Err(e) = self.jobs.save_fields(job_id, &JobUpdate::failed(message.clone())) {
            tracing::error!(job_id = %job_id, error = %e, "could not mark job as failed");
        }
        progress.report(ProgressEvent::Failed {
            job_id: job_id.to_string(),
            error: message,
        });
    }
}

/// Fresh UUID file name keeping the upload's extension.
fn unique_name(file: &UploadedFile, default_ext: &str) -> String {
    let sanitized = sanitize_filename(&file.name);
    let ext = Path::new(&sanitized)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| default_ext.to_string());
    format!("{}.{}", Uuid::new_v4(), ext)
}

pub(super) fn job_images_dir(content_images_dir: &str, job_id: &str) -> String {
    format!("{}/{}", content_images_dir.trim_end_matches('/'), job_id)
}
