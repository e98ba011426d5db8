//! Object-store adapter for media blobs.
//!
//! The vault never proxies media bytes: clients upload directly through a
//! presigned URL and the service verifies the result afterwards. The
//! [`ObjectStore`] trait is the seam between the write coordinator and the
//! concrete S3-compatible backend.

pub mod s3;

use async_trait::async_trait;
use std::time::Duration;

pub use s3::{S3ObjectStore, S3Settings};

/// Outcome of a checksum verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// Whether the measured SHA-256 equals the expected one.
    pub matches: bool,
    /// Size in bytes as declared by the backend.
    pub size: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    /// The object does not exist at the given key.
    #[error("object not found")]
    NotFound,
    #[error("object store error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Capability interface over an S3-compatible object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presign a PUT for direct client upload.
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;

    /// Confirm the object exists and compute its SHA-256 in a single
    /// streaming pass, comparing against `expected_sha256` (lowercase hex).
    async fn verify(
        &self,
        key: &str,
        expected_sha256: &str,
    ) -> Result<Verification, ObjectStoreError>;
}
