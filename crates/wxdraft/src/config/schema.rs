use serde::{Deserialize, Serialize};

pub const DEFAULT_PLACEHOLDER_CONTENT: &str =
    "<p>Content is being prepared. Please edit in WeChat backend.</p>";
pub const DEFAULT_DIGEST_MAX_CHARS: usize = 54;
pub const DEFAULT_WECHAT_BASE_URL: &str = "https://api.weixin.qq.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub media_root: String,
    #[serde(default = "default_media_url")]
    pub media_url: String,
    /// Defaults to `<media_root>/wxdraft.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    pub wechat: WeChatConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub draft: DraftConfig,
    #[serde(default)]
    pub media_cache: MediaCacheConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
}

fn default_media_url() -> String {
    "/media/".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeChatConfig {
    pub app_id: String,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub app_secret_file: Option<String>,
    #[serde(default)]
    pub app_secret_env_var: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_WECHAT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub css_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftConfig {
    #[serde(default = "default_placeholder")]
    pub placeholder_content: String,
    #[serde(default = "default_digest_max_chars")]
    pub digest_max_chars: usize,
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER_CONTENT.to_string()
}

fn default_digest_max_chars() -> usize {
    DEFAULT_DIGEST_MAX_CHARS
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            placeholder_content: default_placeholder(),
            digest_max_chars: DEFAULT_DIGEST_MAX_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaCacheConfig {
    /// Entry lifetime; absent means entries never expire.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub persist_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_markdown_dir")]
    pub markdown_dir: String,
    #[serde(default = "default_cover_dir")]
    pub cover_dir: String,
    #[serde(default = "default_content_images_dir")]
    pub content_images_dir: String,
}

fn default_markdown_dir() -> String {
    "uploads/markdown".to_string()
}

fn default_cover_dir() -> String {
    "uploads/cover_images".to_string()
}

fn default_content_images_dir() -> String {
    "uploads/content_images".to_string()
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            markdown_dir: default_markdown_dir(),
            cover_dir: default_cover_dir(),
            content_images_dir: default_content_images_dir(),
        }
    }
}
