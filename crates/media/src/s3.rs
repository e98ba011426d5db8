//! S3-compatible object store backend.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::{ObjectStore, ObjectStoreError, Verification};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client for the configured endpoint.
    ///
    /// Path-style addressing is forced so MinIO and other non-AWS backends
    /// resolve bucket names without virtual-host DNS.
    pub async fn connect(settings: S3Settings) -> Result<Self, ObjectStoreError> {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "cdv-static",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(&settings.endpoint)
            .force_path_style(true)
            .build();
        Ok(Self {
            client: Client::from_conf(config),
            bucket: settings.bucket,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        let presigning = PresigningConfig::expires_in(ttl)
            .context("invalid presign ttl")
            .map_err(ObjectStoreError::Backend)?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| ObjectStoreError::Backend(anyhow!("presign failed: {err}")))?;
        debug!(bucket = %self.bucket, key, "presigned upload url");
        Ok(presigned.uri().to_string())
    }

    async fn verify(
        &self,
        key: &str,
        expected_sha256: &str,
    ) -> Result<Verification, ObjectStoreError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_not_found() {
                    ObjectStoreError::NotFound
                } else {
                    ObjectStoreError::Backend(anyhow!("head object failed: {service}"))
                }
            })?;
        let size = head.content_length().unwrap_or_default();

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(anyhow!("get object failed: {err}")))?;

        // Hash the body chunk by chunk; media can be large and must not be
        // buffered whole.
        let mut body = output.body;
        let mut hasher = Sha256::new();
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| ObjectStoreError::Backend(anyhow!("object read failed: {err}")))?
        {
            hasher.update(&chunk);
        }
        let measured = hex::encode(hasher.finalize());

        debug!(bucket = %self.bucket, key, size, "verified object checksum");
        Ok(Verification {
            matches: measured.eq_ignore_ascii_case(expected_sha256),
            size,
        })
    }
}
