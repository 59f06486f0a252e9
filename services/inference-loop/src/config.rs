//! Configuration management for the inference loop.
//!
//! This module handles loading and validating configuration from environment
//! variables and configuration files, and locating the sync folder the
//! inference program runs in.

use config::{Config, ConfigError, Environment, File};
use edge_pipeline::config::ConfigValidationError;
use edge_pipeline::messages::VIDEO_INFERENCE_TOPIC;
use edge_pipeline::{IotConfig, LoggingConfig, MetricsConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the inference loop.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferenceConfig {
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Inference command configuration
    #[serde(default)]
    pub command: CommandConfig,

    /// Loop timing configuration
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Status topic configuration
    #[serde(default)]
    pub publish: PublishConfig,

    /// IoT publisher configuration
    #[serde(default)]
    pub iot: IotConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics exporter configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the bucket sync folders
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Name suffix identifying the sync folder under `base_dir`
    #[serde(default = "default_bucket_suffix")]
    pub bucket_suffix: String,

    /// Explicit sync folder, skips discovery
    #[serde(default)]
    pub sync_folder: Option<String>,

    /// Optional two-line parameters file
    #[serde(default = "default_parameters_file")]
    pub parameters_file: String,
}

/// What to do when the inference command fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and start the next iteration
    #[default]
    Continue,
    /// Stop the loop and exit with an error
    Exit,
}

/// Inference command configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Executable to run
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the two parameters
    #[serde(default)]
    pub args_prefix: Vec<String>,

    /// Extra environment as KEY=VALUE entries
    #[serde(default = "default_env")]
    pub env: Vec<String>,

    /// Upper bound on a single run in seconds (0 = unbounded)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Failure handling
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

/// Loop timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Added to `num_seconds` before announcing the end of a run
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Pause between iterations
    #[serde(default = "default_loop_delay_secs")]
    pub loop_delay_secs: u64,
}

/// Status topic configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
}

// Default value functions
fn default_base_dir() -> String {
    "/home/xilinx".to_string()
}
fn default_bucket_suffix() -> String {
    "-aws-cloud-and-xilinx-workshop".to_string()
}
fn default_parameters_file() -> String {
    "/home/xilinx/download/parameters.txt".to_string()
}
fn default_program() -> String {
    "/usr/local/bin/pydeephi_yolo.py".to_string()
}
fn default_env() -> Vec<String> {
    vec!["PYTHONPATH=/usr/lib/python3.6".to_string()]
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_grace_secs() -> u64 {
    3
}
fn default_loop_delay_secs() -> u64 {
    1
}
fn default_topic() -> String {
    VIDEO_INFERENCE_TOPIC.to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            bucket_suffix: default_bucket_suffix(),
            sync_folder: None,
            parameters_file: default_parameters_file(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args_prefix: Vec::new(),
            env: default_env(),
            timeout_secs: default_timeout_secs(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            loop_delay_secs: default_loop_delay_secs(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
        }
    }
}

impl InferenceConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Local config file (config/inference-loop.toml)
    /// 2. System config file (/etc/edge/inference-loop.toml)
    /// 3. Environment variables (prefixed with INFERENCE__)
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/inference-loop").required(false))
            .add_source(File::with_name("/etc/edge/inference-loop").required(false))
            // Override with environment variables (e.g., INFERENCE__COMMAND__TIMEOUT_SECS)
            .add_source(
                Environment::with_prefix("INFERENCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.command.program.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "command.program".to_string(),
            ));
        }

        if let Some(entry) = self.command.env.iter().find(|e| parse_env_entry(e).is_none()) {
            return Err(ConfigValidationError::InvalidValue {
                field: "command.env".to_string(),
                message: format!("expected KEY=VALUE, got {:?}", entry),
            });
        }

        if self.publish.topic.is_empty() {
            return Err(ConfigValidationError::MissingField("publish.topic".to_string()));
        }

        if self.paths.sync_folder.is_none() && self.paths.bucket_suffix.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "paths.bucket_suffix or paths.sync_folder".to_string(),
            ));
        }

        self.iot.validate()
    }
}

impl CommandConfig {
    /// Get the run timeout, `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Extra environment as key/value pairs.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter_map(|entry| parse_env_entry(entry))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl ScheduleConfig {
    /// Get the grace period as Duration.
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Get the pause between iterations as Duration.
    pub fn loop_delay(&self) -> Duration {
        Duration::from_secs(self.loop_delay_secs)
    }
}

fn parse_env_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=').filter(|(key, _)| !key.is_empty())
}

/// Errors locating the sync folder.
#[derive(Debug, Error)]
pub enum SyncFolderError {
    #[error("Failed to list {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No directory ending in {suffix:?} under {path}")]
    NotFound { path: String, suffix: String },
}

/// Locate the sync folder the inference program runs in.
///
/// An explicit `sync_folder` wins; otherwise the first directory (by name)
/// under `base_dir` whose name ends with `bucket_suffix` is used.
pub fn resolve_sync_folder(paths: &PathsConfig) -> Result<PathBuf, SyncFolderError> {
    if let Some(ref folder) = paths.sync_folder {
        return Ok(PathBuf::from(folder));
    }

    let base_dir = Path::new(&paths.base_dir);
    let entries = std::fs::read_dir(base_dir).map_err(|source| SyncFolderError::ReadDir {
        path: paths.base_dir.clone(),
        source,
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(&paths.bucket_suffix))
        })
        .map(|entry| entry.path())
        .collect();

    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| SyncFolderError::NotFound {
            path: paths.base_dir.clone(),
            suffix: paths.bucket_suffix.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = InferenceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.publish.topic, "/unit_controller/video_inference");
        assert_eq!(config.schedule.grace(), Duration::from_secs(3));
        assert_eq!(config.schedule.loop_delay(), Duration::from_secs(1));
        assert_eq!(config.command.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.command.on_failure, FailurePolicy::Continue);
    }

    #[test]
    fn test_env_pairs() {
        let config = CommandConfig::default();
        assert_eq!(
            config.env_pairs(),
            vec![("PYTHONPATH".to_string(), "/usr/lib/python3.6".to_string())]
        );
    }

    #[test]
    fn test_invalid_env_entry() {
        let mut config = InferenceConfig::default();
        config.command.env = vec!["PYTHONPATH".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_program() {
        let mut config = InferenceConfig::default();
        config.command.program = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let config = CommandConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_failure_policy_deserialization() {
        let toml = r#"
            [command]
            on_failure = "exit"
            timeout_secs = 30
        "#;

        let config: InferenceConfig = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.command.on_failure, FailurePolicy::Exit);
        assert_eq!(config.command.timeout_secs, 30);
        assert_eq!(config.command.program, "/usr/local/bin/pydeephi_yolo.py");
    }

    #[test]
    fn test_resolve_sync_folder_by_suffix() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("download")).unwrap();
        std::fs::create_dir(dir.path().join("zeta-aws-cloud-and-xilinx-workshop")).unwrap();
        std::fs::create_dir(dir.path().join("acme-aws-cloud-and-xilinx-workshop")).unwrap();
        std::fs::write(dir.path().join("file-aws-cloud-and-xilinx-workshop"), "").unwrap();

        let paths = PathsConfig {
            base_dir: dir.path().display().to_string(),
            ..Default::default()
        };

        assert_eq!(
            resolve_sync_folder(&paths).unwrap(),
            dir.path().join("acme-aws-cloud-and-xilinx-workshop")
        );
    }

    #[test]
    fn test_resolve_sync_folder_explicit() {
        let paths = PathsConfig {
            sync_folder: Some("/data/sync".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_sync_folder(&paths).unwrap(), PathBuf::from("/data/sync"));
    }

    #[test]
    fn test_resolve_sync_folder_not_found() {
        let dir = tempdir().unwrap();
        let paths = PathsConfig {
            base_dir: dir.path().display().to_string(),
            ..Default::default()
        };
        assert!(matches!(
            resolve_sync_folder(&paths),
            Err(SyncFolderError::NotFound { .. })
        ));
    }
}
