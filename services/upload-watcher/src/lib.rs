//! Edge Upload Watcher
//!
//! Watches the local sync folder for detection results written by the video
//! inference program. When a `.txt` result reports a non-zero detection count,
//! the matching `.jpg` frame is uploaded to S3 and a notification is published
//! for the core group.
//!
//! ## Architecture
//!
//! ```text
//! sync folder ──▶ FsWatcher ──▶ mpsc ──▶ DetectionHandler ──┬──▶ S3 (portal/images/<frame>.jpg)
//!   <id>.txt                                                └──▶ IoT topic compressor/<group>
//!   <id>.jpg
//! ```

pub mod config;
pub mod dedup;
pub mod detection;
pub mod handler;
pub mod s3_uploader;
pub mod watcher;

pub use config::Config;
pub use detection::{SkipReason, UploadDecision};
pub use handler::{DetectionHandler, HandleOutcome, HandlerError};
pub use s3_uploader::{ObjectStore, S3Uploader, UploadError};
pub use watcher::{FsEvent, FsEventKind, FsWatcher, WatchError};
