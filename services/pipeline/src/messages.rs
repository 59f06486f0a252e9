//! JSON payloads published by the edge services.
//!
//! Field names and topic strings are consumed by downstream subscribers and
//! must not change.

use serde::{Deserialize, Serialize};

/// Topic for inference loop status notifications
pub const VIDEO_INFERENCE_TOPIC: &str = "/unit_controller/video_inference";

/// Prefix of the per core-group detection topic
pub const COMPRESSOR_TOPIC_PREFIX: &str = "compressor";

/// Build the detection topic for a core group: `compressor/<group>`
pub fn compressor_topic(core_group: &str) -> String {
    format!("{}/{}", COMPRESSOR_TOPIC_PREFIX, core_group)
}

/// Notification that a detection frame was uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMessage {
    /// Image file name, relative to the storage key prefix
    pub frame_image: String,
    /// Detection count exactly as read from the result file
    pub num_persons: String,
}

impl UploadMessage {
    pub fn new(frame_image: impl Into<String>, num_persons: impl Into<String>) -> Self {
        Self {
            frame_image: frame_image.into(),
            num_persons: num_persons.into(),
        }
    }
}

/// Inference loop status notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub const STARTING: &'static str = "starting video inference";
    pub const ENDED: &'static str = "ended video inference";

    pub fn starting() -> Self {
        Self {
            message: Self::STARTING.to_string(),
        }
    }

    pub fn ended() -> Self {
        Self {
            message: Self::ENDED.to_string(),
        }
    }
}
