//! Blob storage seam and its S3-compatible adapter.

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;

use crate::config::S3Config;
use crate::error::JobError;

/// Moves whole files between blob storage and the local filesystem.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download `bucket/key` into `dest`, replacing it.
    ///
    /// A missing key is [`JobError::NotFound`].
    async fn get(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), JobError>;

    /// Upload `src` to `bucket/key`, overwriting any existing object.
    async fn put(&self, bucket: &str, key: &str, src: &Path) -> Result<(), JobError>;
}

/// [`BlobStore`] over any S3-compatible service (AWS, MinIO).
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from configuration. Explicit keys take precedence
    /// over the default AWS credential chain.
    pub async fn connect(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(access), Some(secret)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access,
                secret,
                None,
                None,
                "mediaq-static",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "S3 blob store configured",
        );
        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), JobError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    JobError::not_found("blob", format!("{bucket}/{key}"))
                } else {
                    JobError::Storage(format!("get {bucket}/{key}: {service}"))
                }
            })?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| JobError::Storage(format!("read {bucket}/{key}: {e}")))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(bucket, key, dest = %dest.display(), "Blob downloaded");
        Ok(())
    }

    async fn put(&self, bucket: &str, key: &str, src: &Path) -> Result<(), JobError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| JobError::Storage(format!("open {}: {e}", src.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| JobError::Storage(format!("put {bucket}/{key}: {}", e.into_service_error())))?;

        tracing::debug!(bucket, key, "Blob uploaded");
        Ok(())
    }
}
