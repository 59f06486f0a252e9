//! Shared configuration sections for the edge services.
//!
//! Each service embeds these structures in its own top-level configuration so
//! that publishing, logging and metrics are configured the same way everywhere.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while validating configuration
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingField(String),

    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// How outgoing messages are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublisherMode {
    /// Publish through the AWS IoT data plane
    #[default]
    Iot,
    /// Only log topic and payload
    Log,
}

impl PublisherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherMode::Iot => "iot",
            PublisherMode::Log => "log",
        }
    }
}

/// AWS IoT data plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IotConfig {
    /// Delivery mode
    #[serde(default)]
    pub mode: PublisherMode,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Account specific data endpoint (https://xxxx-ats.iot.<region>.amazonaws.com)
    pub endpoint_url: Option<String>,
    /// MQTT quality of service, 0 or 1
    #[serde(default)]
    pub qos: i32,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

impl Default for IotConfig {
    fn default() -> Self {
        Self {
            mode: PublisherMode::default(),
            region: default_region(),
            endpoint_url: None,
            qos: 0,
        }
    }
}

impl IotConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0..=1).contains(&self.qos) {
            return Err(ConfigValidationError::InvalidValue {
                field: "iot.qos".to_string(),
                message: format!("QoS must be 0 or 1, got {}", self.qos),
            });
        }

        if self.mode == PublisherMode::Iot && self.region.is_empty() {
            return Err(ConfigValidationError::MissingField("iot.region".to_string()));
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listener port; exporter disabled when unset
    pub port: Option<u16>,
}
