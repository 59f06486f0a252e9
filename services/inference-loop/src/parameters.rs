//! Run parameters read from the optional on-device parameters file.
//!
//! The file holds `num_seconds` on the first line and `threshold` on the
//! second. It is re-read before every run so operators can change it while
//! the loop is running.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_NUM_SECONDS: u64 = 5;
pub const DEFAULT_THRESHOLD: u64 = 2;

/// Parameters passed to the inference program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceParameters {
    /// How long the program records and infers, in seconds
    pub num_seconds: u64,
    /// Detection threshold
    pub threshold: u64,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            num_seconds: DEFAULT_NUM_SECONDS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl InferenceParameters {
    /// Time to wait after the command returns before announcing the end.
    ///
    /// Saturates instead of overflowing for absurd `num_seconds` values.
    pub fn post_run_delay(&self, grace: Duration) -> Duration {
        Duration::from_secs(self.num_seconds).saturating_add(grace)
    }

    /// Positional arguments for the inference command
    pub fn to_args(&self) -> [String; 2] {
        [self.num_seconds.to_string(), self.threshold.to_string()]
    }

    /// Parse file content; malformed or missing lines keep their default.
    pub fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let defaults = Self::default();

        Self {
            num_seconds: parse_line(lines.next(), "num_seconds", defaults.num_seconds),
            threshold: parse_line(lines.next(), "threshold", defaults.threshold),
        }
    }
}

fn parse_line(line: Option<&str>, name: &str, fallback: u64) -> u64 {
    let Some(line) = line else {
        warn!(parameter = name, fallback, "Parameter missing, using default");
        return fallback;
    };

    match line.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!(
                parameter = name,
                value = %line.trim(),
                error = %e,
                fallback,
                "Malformed parameter, using default"
            );
            fallback
        }
    }
}

/// Read parameters from `path`, falling back to defaults when absent or unreadable
pub async fn read_parameters(path: &Path) -> InferenceParameters {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => InferenceParameters::parse(&content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No parameters file, using defaults");
            InferenceParameters::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read parameters file, using defaults");
            InferenceParameters::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_both_lines() {
        let params = InferenceParameters::parse("10\n3\n");
        assert_eq!(
            params,
            InferenceParameters {
                num_seconds: 10,
                threshold: 3
            }
        );
        assert_eq!(params.post_run_delay(Duration::from_secs(3)), Duration::from_secs(13));
    }

    #[test]
    fn test_parse_tolerates_whitespace_and_crlf() {
        let params = InferenceParameters::parse(" 7 \r\n4\r\n");
        assert_eq!(params.num_seconds, 7);
        assert_eq!(params.threshold, 4);
    }

    #[test]
    fn test_parse_malformed_line_uses_default() {
        let params = InferenceParameters::parse("ten\n3\n");
        assert_eq!(params.num_seconds, DEFAULT_NUM_SECONDS);
        assert_eq!(params.threshold, 3);
    }

    #[test]
    fn test_parse_missing_second_line() {
        let params = InferenceParameters::parse("8");
        assert_eq!(params.num_seconds, 8);
        assert_eq!(params.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_post_run_delay_saturates_for_huge_num_seconds() {
        let params = InferenceParameters::parse("18446744073709551615\n2\n");
        assert_eq!(params.num_seconds, u64::MAX);

        let delay = params.post_run_delay(Duration::from_secs(3));
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn test_to_args() {
        let params = InferenceParameters {
            num_seconds: 10,
            threshold: 3,
        };
        assert_eq!(params.to_args(), ["10".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn test_read_parameters_missing_file() {
        let dir = tempdir().unwrap();
        let params = read_parameters(&dir.path().join("parameters.txt")).await;
        assert_eq!(params, InferenceParameters::default());
        assert_eq!(params.num_seconds, 5);
        assert_eq!(params.threshold, 2);
    }

    #[tokio::test]
    async fn test_read_parameters_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parameters.txt");
        std::fs::write(&path, "10\n3\n").unwrap();

        let params = read_parameters(&path).await;
        assert_eq!(params.num_seconds, 10);
        assert_eq!(params.threshold, 3);
    }
}
