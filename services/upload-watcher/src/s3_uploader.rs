use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::Utc;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur while uploading a frame
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to upload {key} to bucket {bucket}: {message}")]
    PutError {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Destination for frame images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the local file at `local_path` under `key`
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<(), UploadError>;
}

/// Build the object key for an image: `<prefix>/<file_name>`
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

/// S3 uploader for frame images
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
}

impl S3Uploader {
    /// Create a new S3 uploader
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 uploader initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Uploader {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<(), UploadError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| UploadError::ReadError {
                path: local_path.display().to_string(),
                message: e.to_string(),
            })?;

        let content_type = get_content_type(local_path);

        debug!(
            key = %key,
            content_type = %content_type,
            "Uploading frame to S3"
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .metadata("uploaded-at", Utc::now().to_rfc3339())
            .send()
            .await
            .map_err(|e| UploadError::PutError {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: e.to_string(),
            })?;

        info!(key = %key, "Frame uploaded successfully");

        Ok(())
    }
}

/// Get content type from the file extension
fn get_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
