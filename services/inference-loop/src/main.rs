use anyhow::{Context, Result};
use edge_pipeline::build_publisher;
use edge_pipeline::telemetry::{init_metrics, init_tracing, shutdown_signal};
use inference_loop::{resolve_sync_folder, CommandRunner, InferenceConfig, InferenceLoop};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = InferenceConfig::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.logging);

    config.validate().context("Invalid configuration")?;

    let sync_folder =
        resolve_sync_folder(&config.paths).context("Failed to locate sync folder")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sync_folder = %sync_folder.display(),
        program = %config.command.program,
        topic = %config.publish.topic,
        "Starting inference loop"
    );

    init_metrics(&config.metrics)?;

    // Initialize components
    let runner = Arc::new(CommandRunner::new(&config.command, sync_folder));
    let publisher = build_publisher(&config.iot).await;
    let inference = InferenceLoop::new(&config, runner, publisher);

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down inference loop");
        shutdown.cancel();
    });

    inference
        .run(token)
        .await
        .context("Inference loop stopped on failure")?;

    info!("Inference loop stopped");
    Ok(())
}
