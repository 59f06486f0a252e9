//! Edge Pipeline - shared plumbing for the edge inference services
//!
//! This library provides what the upload watcher and the inference loop have
//! in common:
//!
//! - JSON wire messages and their topics
//! - A publisher seam with AWS IoT data plane and log-only implementations
//! - Logging, metrics and shutdown helpers for the service binaries
//!
//! # Example
//!
//! ```rust,no_run
//! use edge_pipeline::{build_publisher, IotConfig, OutgoingMessage, StatusMessage};
//! use edge_pipeline::messages::VIDEO_INFERENCE_TOPIC;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let publisher = build_publisher(&IotConfig::default()).await;
//!     let message = OutgoingMessage::new_json(VIDEO_INFERENCE_TOPIC, &StatusMessage::starting())?;
//!     publisher.publish(message).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod messages;
pub mod publisher;
pub mod telemetry;

// Re-export main types
pub use config::{ConfigValidationError, IotConfig, LoggingConfig, MetricsConfig, PublisherMode};
pub use messages::{compressor_topic, StatusMessage, UploadMessage};
pub use publisher::{
    build_publisher, IotPublisher, LogPublisher, MessagePublisher, OutgoingMessage, PublishError,
};

#[cfg(any(test, feature = "mock"))]
pub use publisher::MockMessagePublisher;
