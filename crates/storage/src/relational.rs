//! Relational storage backend.
//!
//! Conflict detection is delegated to database unique constraints; the
//! cursor predicate and ordering are expressed as sea-orm conditions so they
//! match the in-memory backend exactly.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
};
use std::time::Duration;
use tracing::{info, warn};

use async_trait::async_trait;
use cdv_core::Cursor;
use cdv_core::model::{
    Account, IdempotencyEntry, ListPage, ListQuery, MediaAsset, OpLogEntry, Record,
};

use crate::entity::{accounts, idempotency, media_assets, op_log, records};
use crate::{StorageError, Store, clamp_limit};

/// Idempotent bootstrap DDL, executed at connect.
const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    did TEXT PRIMARY KEY,
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    did TEXT NOT NULL REFERENCES accounts(did),
    collection TEXT NOT NULL,
    rkey TEXT NOT NULL,
    uri TEXT NOT NULL UNIQUE,
    cid TEXT NOT NULL,
    value JSONB NOT NULL,
    indexed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    schema_version TEXT NOT NULL,
    UNIQUE(did, collection, rkey)
);

CREATE INDEX IF NOT EXISTS idx_records_did_collection_indexed_at
    ON records(did, collection, indexed_at DESC);
CREATE INDEX IF NOT EXISTS idx_records_cid ON records(cid);
CREATE INDEX IF NOT EXISTS idx_records_indexed_at ON records(indexed_at DESC);

CREATE TABLE IF NOT EXISTS media_assets (
    asset_id TEXT PRIMARY KEY,
    did TEXT NOT NULL REFERENCES accounts(did),
    uri TEXT NOT NULL UNIQUE,
    mime_type TEXT NOT NULL,
    size BIGINT NOT NULL,
    checksum TEXT NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    UNIQUE(did, asset_id)
);

CREATE TABLE IF NOT EXISTS idempotency (
    key_hash TEXT,
    request_hash TEXT NOT NULL,
    response_body BYTEA NOT NULL,
    response_status INTEGER NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
    PRIMARY KEY (key_hash, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_idempotency_expires_at ON idempotency(expires_at);

CREATE TABLE IF NOT EXISTS op_log (
    seq BIGSERIAL PRIMARY KEY,
    type TEXT NOT NULL,
    ref TEXT NOT NULL,
    did TEXT NOT NULL REFERENCES accounts(did),
    payload JSONB NOT NULL,
    occurred_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_op_log_did ON op_log(did);
CREATE INDEX IF NOT EXISTS idx_op_log_type ON op_log(type);
CREATE INDEX IF NOT EXISTS idx_op_log_occurred_at ON op_log(occurred_at);
"#;

pub struct RelationalStore {
    db: DatabaseConnection,
}

impl RelationalStore {
    /// Connect with production pool settings and run the bootstrap DDL.
    pub async fn connect(dsn: &str) -> Result<Self> {
        const MAX_ATTEMPTS: u32 = 3;
        const RETRY_DELAY: Duration = Duration::from_secs(2);

        let mut attempts = 0;
        let db = loop {
            attempts += 1;

            let mut options = ConnectOptions::new(dsn.to_string());
            options
                .max_connections(20)
                .min_connections(5)
                .connect_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(30 * 60))
                .max_lifetime(Duration::from_secs(60 * 60))
                .sqlx_logging(false)
                .sqlx_slow_statements_logging_settings(
                    tracing::log::LevelFilter::Warn,
                    Duration::from_millis(500),
                );

            match Database::connect(options).await {
                Ok(db) => break db,
                Err(err) if attempts < MAX_ATTEMPTS => {
                    warn!(
                        "database connect failed (attempt {attempts}/{MAX_ATTEMPTS}): {err}"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(err) => return Err(anyhow!("database connect failed: {err}")),
            }
        };

        db.execute_unprepared(SCHEMA_DDL)
            .await
            .map_err(|err| anyhow!("schema bootstrap failed: {err}"))?;
        info!("connected to database (pool min 5 / max 20)");
        Ok(Self { db })
    }
}

fn map_db_err(err: DbErr) -> StorageError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StorageError::Conflict,
        _ => StorageError::Backend(anyhow!(err)),
    }
}

fn record_from_model(model: records::Model) -> Record {
    Record {
        id: model.id,
        did: model.did,
        collection: model.collection,
        rkey: model.rkey,
        uri: model.uri,
        cid: model.cid,
        value: model.value,
        indexed_at: model.indexed_at,
        schema_version: model.schema_version,
    }
}

fn asset_from_model(model: media_assets::Model) -> MediaAsset {
    MediaAsset {
        asset_id: model.asset_id,
        did: model.did,
        uri: model.uri,
        mime_type: model.mime_type,
        size: model.size,
        checksum: model.checksum,
        created_at: model.created_at,
    }
}

#[async_trait]
impl Store for RelationalStore {
    async fn create_account(&self, did: &str) -> Result<(), StorageError> {
        let account = accounts::ActiveModel {
            did: Set(did.to_string()),
            created_at: Set(Utc::now()),
        };
        accounts::Entity::insert(account)
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_account(&self, did: &str) -> Result<Account, StorageError> {
        let model = accounts::Entity::find_by_id(did.to_string())
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StorageError::NotFound)?;
        Ok(Account {
            did: model.did,
            created_at: model.created_at,
        })
    }

    async fn create_record(&self, record: Record) -> Result<(), StorageError> {
        let active = records::ActiveModel {
            id: Set(record.id),
            did: Set(record.did),
            collection: Set(record.collection),
            rkey: Set(record.rkey),
            uri: Set(record.uri),
            cid: Set(record.cid),
            value: Set(record.value),
            indexed_at: Set(record.indexed_at),
            schema_version: Set(record.schema_version),
        };
        records::Entity::insert(active)
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn list_records(&self, query: ListQuery) -> Result<ListPage, StorageError> {
        let limit = clamp_limit(query.limit);

        let mut condition = Condition::all().add(records::Column::Did.eq(&query.did));
        if let Some(collection) = &query.collection {
            condition = condition.add(records::Column::Collection.eq(collection));
        }
        if let Some(since) = query.since {
            condition = condition.add(records::Column::IndexedAt.gte(since));
        }
        if let Some(until) = query.until {
            condition = condition.add(records::Column::IndexedAt.lte(until));
        }
        if let Some(cursor) = &query.cursor {
            condition = condition.add(
                Condition::any()
                    .add(records::Column::IndexedAt.lt(cursor.last_indexed_at))
                    .add(
                        Condition::all()
                            .add(records::Column::IndexedAt.eq(cursor.last_indexed_at))
                            .add(records::Column::Rkey.gt(&cursor.last_r_key)),
                    ),
            );
        }

        // One extra row decides whether a next page exists.
        let mut rows = records::Entity::find()
            .filter(condition)
            .order_by_desc(records::Column::IndexedAt)
            .order_by_asc(records::Column::Rkey)
            .limit(limit + 1)
            .all(&self.db)
            .await
            .map_err(map_db_err)?;

        let has_more = rows.len() as u64 > limit;
        rows.truncate(limit as usize);
        let records: Vec<Record> = rows.into_iter().map(record_from_model).collect();
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
        let model = records::Entity::find()
            .filter(records::Column::Uri.eq(uri))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StorageError::NotFound)?;
        Ok(record_from_model(model))
    }

    async fn create_media_asset(&self, asset: MediaAsset) -> Result<(), StorageError> {
        let active = media_assets::ActiveModel {
            asset_id: Set(asset.asset_id),
            did: Set(asset.did),
            uri: Set(asset.uri),
            mime_type: Set(asset.mime_type),
            size: Set(asset.size),
            checksum: Set(asset.checksum),
            created_at: Set(asset.created_at),
        };
        media_assets::Entity::insert(active)
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_media_asset(&self, asset_id: &str) -> Result<MediaAsset, StorageError> {
        let model = media_assets::Entity::find_by_id(asset_id.to_string())
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StorageError::NotFound)?;
        Ok(asset_from_model(model))
    }

    async fn update_media_asset(&self, asset: MediaAsset) -> Result<(), StorageError> {
        let active = media_assets::ActiveModel {
            asset_id: Set(asset.asset_id),
            did: Set(asset.did),
            uri: Set(asset.uri),
            mime_type: Set(asset.mime_type),
            size: Set(asset.size),
            checksum: Set(asset.checksum),
            created_at: Set(asset.created_at),
        };
        match media_assets::Entity::update(active).exec(&self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StorageError::NotFound),
            Err(err) => Err(map_db_err(err)),
        }
    }

    async fn store_idempotent(&self, entry: IdempotencyEntry) -> Result<(), StorageError> {
        // A live entry under the same key with a different payload is a
        // conflict; expired entries do not block reuse of the key.
        let conflicting = idempotency::Entity::find()
            .filter(idempotency::Column::KeyHash.eq(&entry.key_hash))
            .filter(idempotency::Column::RequestHash.ne(&entry.request_hash))
            .filter(idempotency::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;
        if conflicting.is_some() {
            return Err(StorageError::Conflict);
        }

        let active = idempotency::ActiveModel {
            key_hash: Set(entry.key_hash),
            request_hash: Set(entry.request_hash),
            response_body: Set(entry.response_body),
            response_status: Set(entry.response_status as i32),
            created_at: Set(entry.created_at),
            expires_at: Set(entry.expires_at),
        };
        idempotency::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    idempotency::Column::KeyHash,
                    idempotency::Column::RequestHash,
                ])
                .update_columns([
                    idempotency::Column::ResponseBody,
                    idempotency::Column::ResponseStatus,
                    idempotency::Column::CreatedAt,
                    idempotency::Column::ExpiresAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_idempotent(&self, key_hash: &str) -> Result<IdempotencyEntry, StorageError> {
        let model = idempotency::Entity::find()
            .filter(idempotency::Column::KeyHash.eq(key_hash))
            .filter(idempotency::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StorageError::NotFound)?;
        Ok(IdempotencyEntry {
            key_hash: model.key_hash,
            request_hash: model.request_hash,
            response_body: model.response_body,
            response_status: model.response_status as u16,
            created_at: model.created_at,
            expires_at: model.expires_at,
        })
    }

    async fn append_op(&self, entry: OpLogEntry) -> Result<(), StorageError> {
        let active = op_log::ActiveModel {
            seq: NotSet,
            kind: Set(entry.kind),
            reference: Set(entry.reference),
            did: Set(entry.did),
            payload: Set(entry.payload),
            occurred_at: Set(entry.occurred_at),
        };
        op_log::Entity::insert(active)
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}
