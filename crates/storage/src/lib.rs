//! Storage engine for the Creator Data Vault.
//!
//! The [`Store`] trait is a narrow, backend-neutral capability interface.
//! Two implementations ship: [`MemoryStore`] for tests and development, and
//! [`RelationalStore`] for production. Both observe identical ordering,
//! conflict and expiry semantics; the relational backend leans on database
//! unique constraints for conflict detection, the in-memory backend on a
//! single exclusive lock.

pub mod entity;
pub mod memory;
pub mod relational;

use async_trait::async_trait;

use cdv_core::model::{
    Account, IdempotencyEntry, ListPage, ListQuery, MediaAsset, OpLogEntry, Record,
};

pub use memory::MemoryStore;
pub use relational::RelationalStore;

/// Default page size for record listings.
pub const DEFAULT_LIST_LIMIT: u64 = 25;
/// Upper bound on the page size for record listings.
pub const MAX_LIST_LIMIT: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    /// A unique-key or idempotency-payload conflict.
    #[error("conflict")]
    Conflict,
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Backend-neutral storage interface.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_account(&self, did: &str) -> Result<(), StorageError>;
    async fn get_account(&self, did: &str) -> Result<Account, StorageError>;

    /// Fails with [`StorageError::Conflict`] on any unique-key violation.
    async fn create_record(&self, record: Record) -> Result<(), StorageError>;
    async fn list_records(&self, query: ListQuery) -> Result<ListPage, StorageError>;
    async fn get_record_by_uri(&self, uri: &str) -> Result<Record, StorageError>;

    async fn create_media_asset(&self, asset: MediaAsset) -> Result<(), StorageError>;
    async fn get_media_asset(&self, asset_id: &str) -> Result<MediaAsset, StorageError>;
    async fn update_media_asset(&self, asset: MediaAsset) -> Result<(), StorageError>;

    /// Stores a cached response for an idempotency key.
    ///
    /// A non-expired entry with the same key hash but a different request
    /// hash fails with [`StorageError::Conflict`]; the same pair upserts and
    /// extends the TTL.
    async fn store_idempotent(&self, entry: IdempotencyEntry) -> Result<(), StorageError>;

    /// Any non-expired entry for the key hash, regardless of request hash.
    async fn get_idempotent(&self, key_hash: &str) -> Result<IdempotencyEntry, StorageError>;

    /// Append an audit entry; the backend assigns the sequence number.
    async fn append_op(&self, entry: OpLogEntry) -> Result<(), StorageError>;
}

/// Clamp a requested page size into `[1, MAX_LIST_LIMIT]`, defaulting when
/// unset or zero.
pub fn clamp_limit(limit: u64) -> u64 {
    if limit == 0 {
        DEFAULT_LIST_LIMIT
    } else {
        limit.min(MAX_LIST_LIMIT)
    }
}
