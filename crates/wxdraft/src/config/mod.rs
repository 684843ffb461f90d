pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    Config, DraftConfig, MediaCacheConfig, PreviewConfig, UploadsConfig, WeChatConfig,
    DEFAULT_DIGEST_MAX_CHARS, DEFAULT_PLACEHOLDER_CONTENT, DEFAULT_WECHAT_BASE_URL,
};

/// Default config location: `~/.wxdraft/config.json`.
pub fn default_config_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(".wxdraft").join("config.json"))
}
