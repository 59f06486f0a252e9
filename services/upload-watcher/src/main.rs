use anyhow::{Context, Result};
use edge_pipeline::build_publisher;
use edge_pipeline::telemetry::{init_metrics, init_tracing, shutdown_signal};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use upload_watcher::{Config, DetectionHandler, FsWatcher, S3Uploader};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.logging);

    config.validate().context("Invalid configuration")?;

    let watch_root = config.watch_root();
    let topic = config.topic();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %watch_root.display(),
        bucket = %config.s3.bucket,
        topic = %topic,
        "Starting upload watcher"
    );

    init_metrics(&config.metrics)?;

    // Initialize components
    let uploader = Arc::new(S3Uploader::new(&config.s3).await);
    let publisher = build_publisher(&config.iot).await;

    let mut handler = DetectionHandler::new(
        watch_root.clone(),
        config.s3.key_prefix.clone(),
        topic,
        uploader,
        publisher,
    );
    if let Some(window) = config.dedup_window() {
        info!(window_ms = window.as_millis() as u64, "Duplicate event suppression enabled");
        handler = handler.with_dedup_window(window);
    }

    let (watcher, events) = FsWatcher::start(&watch_root, config.watch.channel_capacity)
        .context("Failed to start sync folder watcher")?;

    let token = CancellationToken::new();
    let mut handler_task = tokio::spawn(handler.run(events, token.clone()));

    info!("Upload watcher started successfully");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutting down upload watcher");
            token.cancel();
            if let Err(e) = handler_task.await {
                warn!(error = %e, "Detection handler task failed");
            }
        }
        result = &mut handler_task => {
            warn!("Detection handler exited unexpectedly");
            result.context("Detection handler task failed")?;
        }
    }

    drop(watcher);
    info!("Upload watcher stopped");

    Ok(())
}
