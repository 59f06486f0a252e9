//! Subprocess execution of the external inference program.

use crate::config::CommandConfig;
use crate::parameters::InferenceParameters;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Errors that can occur while running the inference program.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited unsuccessfully ({status})")]
    Failed { program: String, status: ExitStatus },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} cancelled by shutdown")]
    Cancelled { program: String },
}

impl InferenceError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Spawn { .. } => "spawn",
            InferenceError::Wait { .. } => "wait",
            InferenceError::Failed { .. } => "failed",
            InferenceError::Timeout { .. } => "timeout",
            InferenceError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Runs one inference pass to completion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceRunner: Send + Sync {
    async fn run(
        &self,
        params: InferenceParameters,
        token: CancellationToken,
    ) -> Result<(), InferenceError>;
}

/// Runs the inference program as a child process
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args_prefix: Vec<String>,
    env: Vec<(String, String)>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

enum WaitOutcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

impl CommandRunner {
    pub fn new(config: &CommandConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            args_prefix: config.args_prefix.clone(),
            env: config.env_pairs(),
            working_dir: working_dir.into(),
            timeout: config.timeout(),
        }
    }

    fn build_command(&self, params: &InferenceParameters) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args_prefix)
            .args(params.to_args())
            .current_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        command
    }

    async fn wait(&self, child: &mut Child, token: &CancellationToken) -> WaitOutcome {
        let exited = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                    Ok(result) => WaitOutcome::Exited(result),
                    Err(_) => WaitOutcome::TimedOut(limit),
                },
                None => WaitOutcome::Exited(child.wait().await),
            }
        };

        tokio::select! {
            _ = token.cancelled() => WaitOutcome::Cancelled,
            outcome = exited => outcome,
        }
    }

    async fn kill(&self, child: &mut Child) {
        if let Err(e) = child.kill().await {
            warn!(program = %self.program, error = %e, "Failed to kill inference process");
        }
    }
}

#[async_trait]
impl InferenceRunner for CommandRunner {
    #[instrument(skip(self, token), fields(program = %self.program))]
    async fn run(
        &self,
        params: InferenceParameters,
        token: CancellationToken,
    ) -> Result<(), InferenceError> {
        info!(
            working_dir = %self.working_dir.display(),
            num_seconds = params.num_seconds,
            threshold = params.threshold,
            "Running inference program"
        );

        let started = Instant::now();
        let mut child = self
            .build_command(&params)
            .spawn()
            .map_err(|source| InferenceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        match self.wait(&mut child, &token).await {
            WaitOutcome::Exited(Ok(status)) if status.success() => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Inference program finished");
                Ok(())
            }
            WaitOutcome::Exited(Ok(status)) => Err(InferenceError::Failed {
                program: self.program.clone(),
                status,
            }),
            WaitOutcome::Exited(Err(source)) => Err(InferenceError::Wait {
                program: self.program.clone(),
                source,
            }),
            WaitOutcome::TimedOut(timeout) => {
                self.kill(&mut child).await;
                Err(InferenceError::Timeout {
                    program: self.program.clone(),
                    timeout,
                })
            }
            WaitOutcome::Cancelled => {
                self.kill(&mut child).await;
                Err(InferenceError::Cancelled {
                    program: self.program.clone(),
                })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_runner(program: &str, args_prefix: &[&str], timeout_secs: u64) -> CommandConfig {
        CommandConfig {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|s| s.to_string()).collect(),
            env: vec!["EDGE_TEST_MARKER=present".to_string()],
            timeout_secs,
            ..Default::default()
        }
    }

    fn params(num_seconds: u64, threshold: u64) -> InferenceParameters {
        InferenceParameters {
            num_seconds,
            threshold,
        }
    }

    #[tokio::test]
    async fn test_passes_parameters_env_and_working_dir() {
        let dir = tempdir().unwrap();
        let config = create_runner(
            "sh",
            &["-c", "echo \"$0 $1 $EDGE_TEST_MARKER\" > args.txt"],
            10,
        );
        let runner = CommandRunner::new(&config, dir.path());

        runner
            .run(params(10, 3), CancellationToken::new())
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
        assert_eq!(written.trim(), "10 3 present");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let dir = tempdir().unwrap();
        let config = create_runner("sh", &["-c", "exit 2"], 10);
        let runner = CommandRunner::new(&config, dir.path());

        let err = runner
            .run(params(5, 2), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            InferenceError::Failed { status, .. } => assert_eq!(status.code(), Some(2)),
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempdir().unwrap();
        let config = create_runner("/nonexistent/pydeephi_yolo.py", &[], 10);
        let runner = CommandRunner::new(&config, dir.path());

        let err = runner
            .run(params(5, 2), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "spawn");
    }

    #[tokio::test]
    async fn test_timeout_kills_program() {
        let dir = tempdir().unwrap();
        let config = create_runner("sh", &["-c", "sleep 30"], 1);
        let runner = CommandRunner::new(&config, dir.path());

        let started = Instant::now();
        let err = runner
            .run(params(5, 2), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "timeout");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation_kills_program() {
        let dir = tempdir().unwrap();
        let config = create_runner("sh", &["-c", "sleep 30"], 0);
        let runner = CommandRunner::new(&config, dir.path());

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let err = runner.run(params(5, 2), token).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }
}
