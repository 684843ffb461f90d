use serde::Serialize;
use tokio::sync::broadcast;

/// Steps of the two pipeline operations, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPhase {
    SavingUploads,
    OptimizingCover,
    UploadingCover,
    ParsingMarkdown,
    Rendering,
    WritingPreview,
    Submitting,
    RetryingThumbnail,
}

/// Events emitted while a job is processed or published.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Phase {
        job_id: String,
        phase: PublishPhase,
        message: String,
    },
    Completed {
        job_id: String,
        /// Preview URL after processing, draft media id after publishing.
        result: String,
    },
    Failed {
        job_id: String,
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to a broadcast channel. Events sent while nobody is
/// subscribed are dropped.
#[derive(Clone)]
pub struct ChannelProgress {
    sender: broadcast::Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}
