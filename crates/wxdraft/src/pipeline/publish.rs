//! `ConfirmAndPublish`: turning a previewed job into a WeChat draft.

use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use crate::job::{JobStatus, JobUpdate, PublishingJob};
use crate::processor::ImageTarget;
use crate::wechat::DraftPayload;

use super::context::PublishOutcome;
use super::error::PipelineError;
use super::payload::{build_draft_payload, DraftSettings};
use super::progress::{ProgressEvent, ProgressReporter, PublishPhase};
use super::runner::Pipeline;

impl Pipeline {
    /// Submits the draft for a job in `PREVIEW_READY`.
    ///
    /// A job in any other state is rejected with `Conflict` and left as it
    /// is. If WeChat rejects the thumbnail as expired, the cover is uploaded
    /// again and the submission retried exactly once.
    pub async fn confirm_and_publish(
        &self,
        job_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<PublishOutcome, PipelineError> {
        self.publish_job(job_id, progress)
            .instrument(info_span!("confirm_and_publish", job_id = %job_id))
            .await
    }

    async fn publish_job(
        &self,
        job_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<PublishOutcome, PipelineError> {
        let job = self
            .jobs
            .load(job_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("job {}", job_id)))?;

        if job.status != JobStatus::PreviewReady {
            return Err(PipelineError::Conflict(format!(
                "job {} is {}, expected {}",
                job_id,
                job.status,
                JobStatus::PreviewReady
            )));
        }

        match self.run_publish(&job, progress).await {
            Ok(outcome) => {
                info!(retried = outcome.thumbnail_refreshed, "draft created");
                self.cache.persist();
                progress.report(ProgressEvent::Completed {
                    job_id: job_id.to_string(),
                    result: outcome.media_id.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                self.fail_job(job_id, &e, progress);
                Err(e)
            }
        }
    }

    async fn run_publish(
        &self,
        job: &PublishingJob,
        progress: &dyn ProgressReporter,
    ) -> Result<PublishOutcome, PipelineError> {
        let thumb_media_id = job
            .thumb_media_id()
            .ok_or_else(|| PipelineError::Validation("job has no thumbnail media id".to_string()))?
            .to_string();
        job.metadata
            .require_title()
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        self.jobs
            .save_fields(&job.id, &JobUpdate::status(JobStatus::Publishing))?;

        let preview_html = self.preview_html(job);
        let settings = DraftSettings {
            placeholder_content: &self.config.placeholder_content,
            digest_max_chars: self.config.digest_max_chars,
        };

        progress.report(ProgressEvent::Phase {
            job_id: job.id.clone(),
            phase: PublishPhase::Submitting,
            message: "Submitting draft...".to_string(),
        });
        let token = self.wechat.access_token().await?;
        let payload = build_draft_payload(&job.metadata, &thumb_media_id, &preview_html, &settings)?;

        let (media_id, thumbnail_refreshed) = match self.submit(&token, &payload).await {
            Ok(media_id) => (media_id, false),
            Err(e) if e.is_expired_media() => {
                warn!(error = %e, "thumbnail rejected as expired, uploading it again");
                progress.report(ProgressEvent::Phase {
                    job_id: job.id.clone(),
                    phase: PublishPhase::RetryingThumbnail,
                    message: "Thumbnail expired, uploading it again...".to_string(),
                });

                self.wechat.invalidate_token().await;
                let token = self.wechat.access_token().await?;
                let new_thumb = self.refresh_thumbnail(job, &token).await?;

                let payload =
                    build_draft_payload(&job.metadata, &new_thumb, &preview_html, &settings)?;
                let media_id = self.submit(&token, &payload).await?;
                (media_id, true)
            }
            Err(e) => return Err(e.into()),
        };

        self.jobs.save_fields(
            &job.id,
            &JobUpdate {
                status: Some(JobStatus::Published),
                wechat_media_id: Some(Some(media_id.clone())),
                error_message: Some(None),
                published_at: Some(Utc::now()),
                ..Default::default()
            },
        )?;

        Ok(PublishOutcome {
            job_id: job.id.clone(),
            media_id,
            thumbnail_refreshed,
        })
    }

    async fn submit(
        &self,
        token: &str,
        payload: &DraftPayload,
    ) -> Result<String, crate::wechat::WeChatError> {
        self.wechat
            .submit_draft(token, payload)
            .instrument(info_span!("submit_draft"))
            .await
    }

    /// Re-optimizes and uploads the job's original cover, bypassing the
    /// cache, then records the new id on the job and in the cache.
    async fn refresh_thumbnail(
        &self,
        job: &PublishingJob,
        token: &str,
    ) -> Result<String, PipelineError> {
        let cover = job.original_cover_image_path.as_deref().ok_or_else(|| {
            PipelineError::Validation("job has no original cover image to re-upload".to_string())
        })?;

        let source = self.storage.absolute_path(cover)?;
        let optimized = self.optimizer.optimize(&source, &ImageTarget::thumbnail())?;
        let media_id = self.wechat.upload_thumbnail(token, &optimized).await?;

        self.jobs.save_fields(
            &job.id,
            &JobUpdate::default().with_thumb_media_id(media_id.clone()),
        )?;
        if let Some(digest) = self.hasher.hash(&optimized) {
            self.cache.put_thumb(&digest, &media_id);
        }
        info!("thumbnail re-uploaded");
        Ok(media_id)
    }

    /// The stored preview, or an empty string when it cannot be read; the
    /// digest then falls back to its default.
    fn preview_html(&self, job: &PublishingJob) -> String {
        let Some(path) = job.preview_path.as_deref() else {
            return String::new();
        };
        match self.storage.read_file(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(error = %e, "preview unavailable for digest");
                String::new()
            }
        }
    }
}
