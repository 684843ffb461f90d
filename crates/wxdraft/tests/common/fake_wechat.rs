//! Scripted stand-in for the WeChat API.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use wxdraft::wechat::{DraftPayload, WeChatApi, WeChatError, EXPIRED_MEDIA_ERRCODE};

/// Counts every call and answers from a script.
///
/// Thumbnails get ids `thumb-1`, `thumb-2`, ... in upload order. Draft
/// submissions pop the next scripted result and default to success.
#[derive(Default)]
pub struct ScriptedWeChat {
    pub token_calls: AtomicUsize,
    pub invalidations: AtomicUsize,
    pub thumb_uploads: AtomicUsize,
    pub image_uploads: AtomicUsize,
    pub submits: AtomicUsize,
    pub fail_thumbnails: AtomicBool,
    failing_images: Mutex<Vec<String>>,
    submit_script: Mutex<VecDeque<Result<String, WeChatError>>>,
    submitted: Mutex<Vec<DraftPayload>>,
}

impl ScriptedWeChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next draft submission.
    pub fn script_submit(&self, result: Result<String, WeChatError>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    /// Content images whose file name contains `fragment` fail to upload.
    pub fn fail_images_named(&self, fragment: &str) {
        self.failing_images.lock().unwrap().push(fragment.to_string());
    }

    pub fn submitted(&self) -> Vec<DraftPayload> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub fn expired_media() -> WeChatError {
    WeChatError::Api {
        code: EXPIRED_MEDIA_ERRCODE,
        message: "invalid media_id".to_string(),
    }
}

pub fn api_error(code: i64, message: &str) -> WeChatError {
    WeChatError::Api {
        code,
        message: message.to_string(),
    }
}

#[async_trait]
impl WeChatApi for ScriptedWeChat {
    async fn access_token(&self) -> Result<String, WeChatError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst);
        let generation = self.invalidations.load(Ordering::SeqCst);
        Ok(format!("token-{}-{}", generation, n))
    }

    async fn invalidate_token(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    async fn upload_thumbnail(&self, _token: &str, path: &Path) -> Result<String, WeChatError> {
        assert!(path.exists(), "thumbnail upload of a missing file");
        let n = self.thumb_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_thumbnails.load(Ordering::SeqCst) {
            return Err(api_error(40009, "invalid image size"));
        }
        Ok(format!("thumb-{}", n))
    }

    async fn upload_content_image(&self, _token: &str, path: &Path) -> Result<String, WeChatError> {
        let n = self.image_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self
            .failing_images
            .lock()
            .unwrap()
            .iter()
            .any(|f| name.contains(f.as_str()))
        {
            return Err(api_error(40113, "unsupported file type"));
        }
        Ok(format!("https://mmbiz.qpic.cn/mmbiz_png/{}/{}", n, name))
    }

    async fn submit_draft(&self, _token: &str, payload: &DraftPayload) -> Result<String, WeChatError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted.lock().unwrap().push(payload.clone());
        self.submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("draft-{}", n)))
    }
}
