use crate::dedup::DedupWindow;
use crate::detection::{self, SkipReason, UploadDecision};
use crate::s3_uploader::{object_key, ObjectStore, UploadError};
use crate::watcher::FsEvent;
use edge_pipeline::{MessagePublisher, OutgoingMessage, PublishError, UploadMessage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Errors that can occur while handling a detection event
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl HandlerError {
    /// Operation that failed, for log context
    pub fn operation(&self) -> &'static str {
        match self {
            HandlerError::Upload(_) => "upload",
            HandlerError::Publish(_) => "publish",
        }
    }

    /// Counter incremented when this error is reported
    pub fn failure_metric(&self) -> &'static str {
        match self {
            HandlerError::Upload(_) => "upload_watcher.uploads.failed",
            HandlerError::Publish(_) => "upload_watcher.notifications.failed",
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Event dropped before any side effect
    Skipped(SkipReason),
    /// Same file state already handled within the dedup window
    Duplicate,
    /// Image uploaded under `key` and notification published
    Uploaded { key: String },
}

/// Turns detection result events into an upload plus a notification
pub struct DetectionHandler {
    root: PathBuf,
    key_prefix: String,
    topic: String,
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn MessagePublisher>,
    dedup: Option<DedupWindow>,
}

impl DetectionHandler {
    pub fn new(
        root: impl Into<PathBuf>,
        key_prefix: impl Into<String>,
        topic: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            root: root.into(),
            key_prefix: key_prefix.into(),
            topic: topic.into(),
            store,
            publisher,
            dedup: None,
        }
    }

    /// Suppress repeat events for an unchanged file within `window`
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup = Some(DedupWindow::new(window));
        self
    }

    /// Handle a single filesystem event
    #[instrument(skip(self, event), fields(kind = %event.kind, path = %event.path.display()))]
    pub async fn handle(&mut self, event: &FsEvent) -> Result<HandleOutcome, HandlerError> {
        let (image_name, num_persons) = match detection::evaluate(&event.path).await {
            UploadDecision::Upload {
                image_name,
                num_persons,
            } => (image_name, num_persons),
            UploadDecision::Skip { reason } => {
                metrics::counter!("upload_watcher.events.skipped").increment(1);
                return Ok(HandleOutcome::Skipped(reason));
            }
        };

        let mtime = self.file_mtime(&event.path).await;
        if self.is_duplicate(&event.path, mtime) {
            debug!("Duplicate event within dedup window");
            metrics::counter!("upload_watcher.events.duplicate").increment(1);
            return Ok(HandleOutcome::Duplicate);
        }

        info!(num_persons = %num_persons, image = %image_name, "Detections found");

        let image_path = self.root.join(&image_name);
        let key = object_key(&self.key_prefix, &image_name);

        self.store.upload_file(&image_path, &key).await?;
        metrics::counter!("upload_watcher.uploads.succeeded").increment(1);
        self.record_handled(&event.path, mtime);

        let message =
            OutgoingMessage::new_json(&self.topic, &UploadMessage::new(image_name, num_persons))?;

        info!(topic = %self.topic, "Publishing detection notification");
        self.publisher.publish(message).await?;
        metrics::counter!("upload_watcher.notifications.published").increment(1);

        Ok(HandleOutcome::Uploaded { key })
    }

    /// Modification time, only looked up when the dedup window is enabled
    async fn file_mtime(&self, path: &Path) -> Option<SystemTime> {
        self.dedup.as_ref()?;
        tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok()
    }

    fn is_duplicate(&mut self, path: &Path, mtime: Option<SystemTime>) -> bool {
        match (self.dedup.as_mut(), mtime) {
            (Some(dedup), Some(mtime)) => dedup.is_duplicate(path, mtime, Instant::now()),
            _ => false,
        }
    }

    fn record_handled(&mut self, path: &Path, mtime: Option<SystemTime>) {
        if let (Some(dedup), Some(mtime)) = (self.dedup.as_mut(), mtime) {
            dedup.record(path, mtime, Instant::now());
        }
    }

    /// Drain the event queue until it closes or `token` is cancelled.
    ///
    /// Failures are logged and never stop the loop.
    pub async fn run(mut self, mut events: mpsc::Receiver<FsEvent>, token: CancellationToken) {
        info!(root = %self.root.display(), topic = %self.topic, "Detection handler started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Detection handler cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Filesystem event queue closed");
                        break;
                    };
                    self.dispatch(event).await;
                }
            }
        }
    }

    async fn dispatch(&mut self, event: FsEvent) {
        metrics::counter!("upload_watcher.events.received").increment(1);

        match self.handle(&event).await {
            Ok(HandleOutcome::Uploaded { key }) => {
                debug!(path = %event.path.display(), key = %key, "Event handled");
            }
            Ok(_) => {}
            Err(e) => {
                metrics::counter!(e.failure_metric()).increment(1);
                error!(
                    error = %e,
                    operation = e.operation(),
                    kind = %event.kind,
                    path = %event.path.display(),
                    topic = %self.topic,
                    "Failed to handle detection event"
                );
            }
        }
    }
}
