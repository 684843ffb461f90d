use std::path::PathBuf;
use std::time::Duration;

use crate::config::schema::{UploadsConfig, DEFAULT_DIGEST_MAX_CHARS, DEFAULT_PLACEHOLDER_CONTENT};
use crate::config::Config;
use crate::secrets::{expand_home, SecretSource};
use crate::wechat::WeChatClientConfig;

use super::error::PipelineError;

pub struct PipelineConfig {
    pub media_root: PathBuf,
    /// Prefix joined with a stored relative path to form a public URL.
    pub media_url: String,
    pub database_path: PathBuf,
    pub css_path: Option<PathBuf>,
    pub placeholder_content: String,
    pub digest_max_chars: usize,
    pub cache_ttl: Option<Duration>,
    pub cache_persist_path: Option<PathBuf>,
    pub uploads: UploadsConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut pipeline = Self::with_media_root(expand_home(&config.media_root));
        if let Some(path) = config.database_path.as_deref() {
            pipeline.database_path = expand_home(path);
        }

        Self {
            media_url: config.media_url.clone(),
            css_path: config.preview.css_path.as_deref().map(expand_home),
            placeholder_content: config.draft.placeholder_content.clone(),
            digest_max_chars: config.draft.digest_max_chars,
            cache_ttl: config.media_cache.ttl_secs.map(Duration::from_secs),
            cache_persist_path: config.media_cache.persist_path.as_deref().map(expand_home),
            uploads: config.uploads.clone(),
            ..pipeline
        }
    }

    /// Defaults for everything except the media root.
    pub fn with_media_root(media_root: impl Into<PathBuf>) -> Self {
        let media_root = media_root.into();
        Self {
            media_url: "/media/".to_string(),
            database_path: media_root.join("wxdraft.db"),
            css_path: None,
            placeholder_content: DEFAULT_PLACEHOLDER_CONTENT.to_string(),
            digest_max_chars: DEFAULT_DIGEST_MAX_CHARS,
            cache_ttl: None,
            cache_persist_path: None,
            uploads: UploadsConfig::default(),
            media_root,
        }
    }

    pub fn preview_url(&self, relative_path: &str) -> String {
        format!("{}{}", self.media_url, relative_path)
    }
}

/// Resolves WeChat credentials. A missing app id or secret is a
/// configuration error, never defaulted.
pub fn wechat_client_config(config: &Config) -> Result<WeChatClientConfig, PipelineError> {
    let wechat = &config.wechat;
    if wechat.app_id.trim().is_empty() {
        return Err(PipelineError::Configuration(
            "wechat.app_id is not set".to_string(),
        ));
    }

    let app_secret = SecretSource {
        direct: wechat.app_secret.as_deref(),
        file: wechat.app_secret_file.as_deref(),
        env_var: wechat.app_secret_env_var.as_deref(),
    }
    .resolve()
    .map_err(|e| PipelineError::Configuration(format!("WeChat app secret: {}", e)))?;

    Ok(WeChatClientConfig {
        app_id: wechat.app_id.trim().to_string(),
        app_secret,
        base_url: wechat.base_url.clone(),
        request_timeout: Duration::from_secs(wechat.request_timeout_secs),
        connect_timeout: Duration::from_secs(wechat.connect_timeout_secs),
    })
}
