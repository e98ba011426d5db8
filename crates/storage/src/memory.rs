//! In-memory storage backend for tests and development.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use cdv_core::Cursor;
use cdv_core::model::{
    Account, IdempotencyEntry, ListPage, ListQuery, MediaAsset, OpLogEntry, Record,
};

use crate::{StorageError, Store, clamp_limit};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    /// Keyed by URI.
    records: HashMap<String, Record>,
    assets: HashMap<String, MediaAsset>,
    /// At most one entry per key hash.
    idempotency: HashMap<String, IdempotencyEntry>,
    ops: Vec<OpLogEntry>,
}

/// All state behind one exclusive lock; reads take the read half.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_account(&self, did: &str) -> Result<(), StorageError> {
        let mut inner = self.write();
        if inner.accounts.contains_key(did) {
            return Err(StorageError::Conflict);
        }
        inner.accounts.insert(
            did.to_string(),
            Account {
                did: did.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_account(&self, did: &str) -> Result<Account, StorageError> {
        self.read()
            .accounts
            .get(did)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn create_record(&self, record: Record) -> Result<(), StorageError> {
        let mut inner = self.write();
        if !inner.accounts.contains_key(&record.did) {
            return Err(StorageError::Backend(anyhow!(
                "account not found: {}",
                record.did
            )));
        }
        if inner.records.contains_key(&record.uri) {
            return Err(StorageError::Conflict);
        }
        if inner.records.values().any(|r| {
            r.did == record.did && r.collection == record.collection && r.rkey == record.rkey
        }) {
            return Err(StorageError::Conflict);
        }
        inner.records.insert(record.uri.clone(), record);
        Ok(())
    }

    async fn list_records(&self, query: ListQuery) -> Result<ListPage, StorageError> {
        let inner = self.read();
        let limit = clamp_limit(query.limit) as usize;

        let mut matches: Vec<&Record> = inner
            .records
            .values()
            .filter(|r| r.did == query.did)
            .filter(|r| {
                query
                    .collection
                    .as_deref()
                    .is_none_or(|c| r.collection == c)
            })
            .filter(|r| query.since.is_none_or(|s| r.indexed_at >= s))
            .filter(|r| query.until.is_none_or(|u| r.indexed_at <= u))
            .filter(|r| match &query.cursor {
                None => true,
                Some(cursor) => {
                    r.indexed_at < cursor.last_indexed_at
                        || (r.indexed_at == cursor.last_indexed_at && r.rkey > cursor.last_r_key)
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.indexed_at
                .cmp(&a.indexed_at)
                .then_with(|| a.rkey.cmp(&b.rkey))
        });

        let has_more = matches.len() > limit;
        let records: Vec<Record> = matches.into_iter().take(limit).cloned().collect();
        let next_cursor = if has_more {
            records
                .last()
                .map(|last| Cursor::new(last.indexed_at, last.rkey.clone()).encode())
        } else {
            None
        };

        Ok(ListPage {
            records,
            next_cursor,
        })
    }

    async fn get_record_by_uri(&self, uri: &str) -> Result<Record, StorageError> {
        self.read()
            .records
            .get(uri)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn create_media_asset(&self, asset: MediaAsset) -> Result<(), StorageError> {
        let mut inner = self.write();
        if !inner.accounts.contains_key(&asset.did) {
            return Err(StorageError::Backend(anyhow!(
                "account not found: {}",
                asset.did
            )));
        }
        if inner.assets.contains_key(&asset.asset_id) {
            return Err(StorageError::Conflict);
        }
        inner.assets.insert(asset.asset_id.clone(), asset);
        Ok(())
    }

    async fn get_media_asset(&self, asset_id: &str) -> Result<MediaAsset, StorageError> {
        self.read()
            .assets
            .get(asset_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn update_media_asset(&self, asset: MediaAsset) -> Result<(), StorageError> {
        let mut inner = self.write();
        if !inner.assets.contains_key(&asset.asset_id) {
            return Err(StorageError::NotFound);
        }
        inner.assets.insert(asset.asset_id.clone(), asset);
        Ok(())
    }

    async fn store_idempotent(&self, entry: IdempotencyEntry) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut inner = self.write();
        inner.idempotency.retain(|_, e| e.expires_at > now);
        if let Some(existing) = inner.idempotency.get(&entry.key_hash) {
            if existing.request_hash != entry.request_hash {
                return Err(StorageError::Conflict);
            }
        }
        inner.idempotency.insert(entry.key_hash.clone(), entry);
        Ok(())
    }

    async fn get_idempotent(&self, key_hash: &str) -> Result<IdempotencyEntry, StorageError> {
        let inner = self.read();
        match inner.idempotency.get(key_hash) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(entry.clone()),
            _ => Err(StorageError::NotFound),
        }
    }

    async fn append_op(&self, mut entry: OpLogEntry) -> Result<(), StorageError> {
        let mut inner = self.write();
        entry.seq = inner.ops.len() as i64 + 1;
        inner.ops.push(entry);
        Ok(())
    }
}
