//! The publishing pipeline: `start_processing` takes uploaded files to a
//! rendered preview, `confirm_and_publish` turns the preview into a draft.

pub mod config;
pub mod context;
pub mod error;
pub mod payload;
pub mod progress;
mod publish;
pub mod runner;

pub use config::{wechat_client_config, PipelineConfig};
pub use context::{ProcessingOutcome, ProcessingRequest, PublishOutcome, UploadedFile};
pub use error::{ErrorKind, PipelineError};
pub use payload::{build_draft_payload, DraftSettings};
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressReporter, PublishPhase};
pub use runner::Pipeline;
