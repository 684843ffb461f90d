pub mod config;
pub mod db;
pub mod error;
pub mod hashing;
pub mod job;
pub mod logging;
pub mod markdown;
pub mod media_cache;
pub mod pipeline;
pub mod processor;
pub mod resolver;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod wechat;

pub use config::{load_config, Config};
pub use error::{ConfigError, ProcessError, Result, StorageError, WxDraftError};
pub use job::{JobStatus, PublishingJob};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use secrets::{resolve_secret, SecretError};
