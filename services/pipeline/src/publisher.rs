//! Message publishing for the edge services.
//!
//! This module provides the [`MessagePublisher`] seam used by both services
//! plus two implementations: one that publishes through the AWS IoT data
//! plane and one that only logs what it would have sent.

use crate::config::{IotConfig, PublisherMode};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_iotdataplane::config::Builder as IotConfigBuilder;
use aws_sdk_iotdataplane::primitives::Blob;
use aws_sdk_iotdataplane::Client as IotDataClient;
use aws_types::region::Region;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur while publishing a message
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize message: {0}")]
    SerializationError(String),

    #[error("Failed to publish message to topic {topic}: {message}")]
    SendError { topic: String, message: String },
}

/// Message to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Topic to publish the message to
    pub topic: String,
    /// Serialized message payload
    pub payload: Vec<u8>,
}

impl OutgoingMessage {
    /// Create a new outgoing message with a JSON payload
    pub fn new_json<T: serde::Serialize>(
        topic: impl Into<String>,
        message: &T,
    ) -> Result<Self, PublishError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| PublishError::SerializationError(e.to_string()))?;
        Ok(Self {
            topic: topic.into(),
            payload,
        })
    }

    /// Payload as UTF-8 text, for logging
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Destination for outgoing messages
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a single message
    async fn publish(&self, message: OutgoingMessage) -> Result<(), PublishError>;
}

/// Publisher backed by the AWS IoT data plane HTTPS API
pub struct IotPublisher {
    client: IotDataClient,
    qos: i32,
}

impl IotPublisher {
    /// Create a new publisher from the ambient AWS credential chain
    pub async fn new(config: &IotConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = IotConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        let client = IotDataClient::from_conf(builder.build());

        info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            qos = config.qos,
            "IoT publisher initialized"
        );

        Self {
            client,
            qos: config.qos,
        }
    }
}

#[async_trait]
impl MessagePublisher for IotPublisher {
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    async fn publish(&self, message: OutgoingMessage) -> Result<(), PublishError> {
        debug!(
            size_bytes = message.payload.len(),
            "Publishing message"
        );

        let topic = message.topic;

        self.client
            .publish()
            .topic(&topic)
            .qos(self.qos)
            .payload(Blob::new(message.payload))
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("edge.messages.failed").increment(1);
                PublishError::SendError {
                    topic: topic.clone(),
                    message: e.to_string(),
                }
            })?;

        metrics::counter!("edge.messages.published").increment(1);
        debug!(topic = %topic, "Message published");

        Ok(())
    }
}

/// Publisher that only writes messages to the log
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl MessagePublisher for LogPublisher {
    async fn publish(&self, message: OutgoingMessage) -> Result<(), PublishError> {
        info!(
            topic = %message.topic,
            payload = %message.payload_str(),
            "Publish (log mode)"
        );
        metrics::counter!("edge.messages.published").increment(1);
        Ok(())
    }
}

/// Build the publisher selected by `config.mode`
pub async fn build_publisher(config: &IotConfig) -> Arc<dyn MessagePublisher> {
    match config.mode {
        PublisherMode::Iot => Arc::new(IotPublisher::new(config).await),
        PublisherMode::Log => {
            info!("Publisher running in log mode, messages are not sent");
            Arc::new(LogPublisher)
        }
    }
}
