//! The starting / run / ended cycle around the inference program.

use crate::config::{FailurePolicy, InferenceConfig};
use crate::parameters::{read_parameters, InferenceParameters};
use crate::runner::{InferenceError, InferenceRunner};
use edge_pipeline::{MessagePublisher, OutgoingMessage, StatusMessage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Repeatedly runs the inference program and announces each run
pub struct InferenceLoop {
    runner: Arc<dyn InferenceRunner>,
    publisher: Arc<dyn MessagePublisher>,
    topic: String,
    parameters_file: PathBuf,
    grace: Duration,
    loop_delay: Duration,
    on_failure: FailurePolicy,
}

impl InferenceLoop {
    pub fn new(
        config: &InferenceConfig,
        runner: Arc<dyn InferenceRunner>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            runner,
            publisher,
            topic: config.publish.topic.clone(),
            parameters_file: PathBuf::from(&config.paths.parameters_file),
            grace: config.schedule.grace(),
            loop_delay: config.schedule.loop_delay(),
            on_failure: config.command.on_failure,
        }
    }

    /// One cycle: announce, run, wait out the recording, announce the end.
    ///
    /// A failed run skips the post-run wait and the "ended" announcement.
    #[instrument(skip(self, token))]
    pub async fn run_iteration(
        &self,
        token: &CancellationToken,
    ) -> Result<InferenceParameters, InferenceError> {
        self.announce(StatusMessage::starting()).await;

        let params = read_parameters(&self.parameters_file).await;
        debug!(
            num_seconds = params.num_seconds,
            threshold = params.threshold,
            "Loaded run parameters"
        );

        let started = Instant::now();
        let result = self.runner.run(params, token.clone()).await;
        metrics::histogram!("inference_loop.run.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = result {
            metrics::counter!("inference_loop.runs.failed").increment(1);
            return Err(e);
        }
        metrics::counter!("inference_loop.runs.succeeded").increment(1);

        let delay = params.post_run_delay(self.grace);
        debug!(delay_secs = delay.as_secs(), "Waiting before announcing end of run");
        tokio::select! {
            _ = token.cancelled() => debug!("Post-run wait cut short by shutdown"),
            _ = tokio::time::sleep(delay) => {}
        }

        self.announce(StatusMessage::ended()).await;

        Ok(params)
    }

    /// Loop until `token` is cancelled.
    ///
    /// Run failures are logged and the loop continues, unless the failure
    /// policy is `exit`, in which case the error is returned.
    pub async fn run(&self, token: CancellationToken) -> Result<(), InferenceError> {
        info!(
            topic = %self.topic,
            parameters_file = %self.parameters_file.display(),
            on_failure = ?self.on_failure,
            "Inference loop started"
        );

        while !token.is_cancelled() {
            match self.run_iteration(&token).await {
                Ok(params) => {
                    info!(num_seconds = params.num_seconds, "Inference run completed");
                }
                Err(InferenceError::Cancelled { .. }) => break,
                Err(e) if self.on_failure == FailurePolicy::Exit => {
                    error!(error = %e, kind = e.kind(), "Inference run failed, stopping");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, kind = e.kind(), "Inference run failed, continuing");
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.loop_delay) => {}
            }
        }

        info!("Inference loop stopped");
        Ok(())
    }

    async fn announce(&self, status: StatusMessage) {
        let message = match OutgoingMessage::new_json(&self.topic, &status) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Failed to encode status message");
                return;
            }
        };

        info!(topic = %self.topic, status = %status.message, "Publishing status");
        if let Err(e) = self.publisher.publish(message).await {
            warn!(error = %e, topic = %self.topic, "Failed to publish status, continuing");
        }
    }
}
