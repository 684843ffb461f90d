//! Test harness for isolated pipeline runs.
//!
//! Each `TestHarness` owns a temporary media root, an in-memory SQLite job
//! store and a `ScriptedWeChat`, wired into a real `Pipeline`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use wxdraft::db::Database;
use wxdraft::job::{JobStore, PublishingJob};
use wxdraft::media_cache::MediaCache;
use wxdraft::pipeline::{
    Pipeline, PipelineConfig, PipelineError, ProcessingOutcome, ProcessingRequest, ProgressEvent,
    ProgressReporter, UploadedFile,
};
use wxdraft::storage::FileStorage;

use super::builders::jpeg_bytes;
use super::fake_wechat::ScriptedWeChat;

/// Keeps every reported event for later assertions.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub media_root: PathBuf,
    pub wechat: Arc<ScriptedWeChat>,
    pub cache: MediaCache,
    pub pipeline: Pipeline,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Builds a harness after letting `adjust` modify the default config.
    pub fn with_config(adjust: impl FnOnce(&mut PipelineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let media_root = temp_dir.path().join("media");
        std::fs::create_dir_all(&media_root).unwrap();

        let mut config = PipelineConfig::with_media_root(&media_root);
        adjust(&mut config);

        let wechat = Arc::new(ScriptedWeChat::new());
        let cache = MediaCache::new(None);
        let pipeline = Pipeline::new(
            Arc::new(config),
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(FileStorage::new(&media_root)),
            wechat.clone(),
            cache.clone(),
        );

        Self {
            temp_dir,
            media_root,
            wechat,
            cache,
            pipeline,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A request with the given article, a default cover and `images`.
    pub fn request(&self, markdown: &str, images: Vec<UploadedFile>) -> ProcessingRequest {
        ProcessingRequest {
            markdown: UploadedFile::new("article.md", markdown.as_bytes().to_vec()),
            cover: UploadedFile::new("cover.jpg", jpeg_bytes(40)),
            content_images: images,
        }
    }

    pub async fn process(
        &self,
        markdown: &str,
        images: Vec<UploadedFile>,
    ) -> Result<ProcessingOutcome, PipelineError> {
        self.pipeline
            .start_processing(self.request(markdown, images), &RecordingProgress::default())
            .await
    }

    /// Id of the most recently created job.
    pub fn latest_job_id(&self) -> String {
        self.pipeline
            .jobs()
            .list(&Default::default())
            .unwrap()
            .first()
            .expect("no job was created")
            .id
            .clone()
    }

    pub fn job(&self, id: &str) -> PublishingJob {
        self.pipeline
            .jobs()
            .load(id)
            .unwrap()
            .unwrap_or_else(|| panic!("job {} not found", id))
    }

    pub fn read_media(&self, relative: &str) -> String {
        std::fs::read_to_string(self.media_root.join(relative)).unwrap()
    }
}
