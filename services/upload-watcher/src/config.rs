use edge_pipeline::config::ConfigValidationError;
use edge_pipeline::{compressor_topic, IotConfig, LoggingConfig, MetricsConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the upload watcher
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Metrics exporter configuration
    pub metrics: MetricsConfig,
    /// Sync folder watch configuration
    pub watch: WatchConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Notification topic configuration
    pub publish: PublishConfig,
    /// IoT publisher configuration
    pub iot: IotConfig,
}

/// Sync folder watch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Directory holding the per-bucket sync folders
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// Explicit watch root; defaults to `<base_dir>/<s3.bucket>`
    pub root: Option<String>,
    /// Suppress repeat events for an unchanged file within this window (0 = off)
    #[serde(default)]
    pub dedup_window_ms: u64,
    /// Capacity of the filesystem event queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for frame storage
    #[serde(default)]
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Key prefix for uploaded images
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// Notification topic configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishConfig {
    /// Greengrass core group the detections are published for
    #[serde(default)]
    pub core_group: String,
    /// Explicit topic; defaults to `compressor/<core_group>`
    pub topic: Option<String>,
}

// Default value functions
fn default_base_dir() -> String {
    "/home/xilinx".to_string()
}

fn default_channel_capacity() -> usize {
    100
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_key_prefix() -> String {
    "portal/images".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            root: None,
            dedup_window_ms: 0,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            key_prefix: default_key_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Deployment variables set on the edge device
            .set_default("s3.bucket", std::env::var("BUCKET").unwrap_or_default())?
            .set_default(
                "publish.core_group",
                std::env::var("COREGROUP").unwrap_or_default(),
            )?
            // Add config file if present
            .add_source(config::File::with_name("config/upload-watcher").required(false))
            .add_source(config::File::with_name("/etc/edge/upload-watcher").required(false))
            // Override with environment variables
            // UPLOAD__S3__REGION -> s3.region
            .add_source(
                config::Environment::with_prefix("UPLOAD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.s3.bucket.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "s3.bucket (or BUCKET)".to_string(),
            ));
        }

        if self.publish.topic.is_none() && self.publish.core_group.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "publish.core_group (or COREGROUP)".to_string(),
            ));
        }

        if self.watch.channel_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "watch.channel_capacity".to_string(),
                message: "Capacity must be greater than 0".to_string(),
            });
        }

        self.iot.validate()
    }

    /// Directory to watch recursively
    pub fn watch_root(&self) -> PathBuf {
        match self.watch.root {
            Some(ref root) => PathBuf::from(root),
            None => PathBuf::from(&self.watch.base_dir).join(&self.s3.bucket),
        }
    }

    /// Topic detection notifications are published to
    pub fn topic(&self) -> String {
        match self.publish.topic {
            Some(ref topic) => topic.clone(),
            None => compressor_topic(&self.publish.core_group),
        }
    }

    /// Get the dedup window as Duration, `None` when disabled
    pub fn dedup_window(&self) -> Option<Duration> {
        (self.watch.dedup_window_ms > 0).then(|| Duration::from_millis(self.watch.dedup_window_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.s3.bucket = "acme-aws-cloud-and-xilinx-workshop".to_string();
        config.publish.core_group = "edge-group-01".to_string();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(create_test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_bucket() {
        let mut config = create_test_config();
        config.s3.bucket = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_missing_core_group_without_topic() {
        let mut config = create_test_config();
        config.publish.core_group = String::new();
        assert!(config.validate().is_err());

        config.publish.topic = Some("compressor/override".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_watch_root_derived_from_bucket() {
        let config = create_test_config();
        assert_eq!(
            config.watch_root(),
            PathBuf::from("/home/xilinx/acme-aws-cloud-and-xilinx-workshop")
        );
    }

    #[test]
    fn test_watch_root_override() {
        let mut config = create_test_config();
        config.watch.root = Some("/data/sync".to_string());
        assert_eq!(config.watch_root(), PathBuf::from("/data/sync"));
    }

    #[test]
    fn test_topic() {
        let config = create_test_config();
        assert_eq!(config.topic(), "compressor/edge-group-01");
    }

    #[test]
    fn test_dedup_window() {
        let mut config = create_test_config();
        assert_eq!(config.dedup_window(), None);

        config.watch.dedup_window_ms = 500;
        assert_eq!(config.dedup_window(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_deserialize_partial_file() {
        let toml = r#"
            [s3]
            bucket = "frames"
            endpoint_url = "http://localhost:9000"
            force_path_style = true

            [publish]
            core_group = "line-2"

            [iot]
            mode = "log"
        "#;

        let config: Config = config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.s3.bucket, "frames");
        assert_eq!(config.s3.key_prefix, "portal/images");
        assert_eq!(config.s3.region, "us-west-2");
        assert!(config.s3.force_path_style);
        assert_eq!(config.watch.base_dir, "/home/xilinx");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.topic(), "compressor/line-2");
        assert!(config.validate().is_ok());
    }
}
