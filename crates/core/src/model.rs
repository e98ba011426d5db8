//! Data model for accounts, records, media assets and the request/response
//! shapes of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;

/// A CDV account, keyed by its decentralized identifier.
///
/// Accounts are created lazily on first write and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub did: String,
    pub created_at: DateTime<Utc>,
}

/// A stored content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub did: String,
    pub collection: String,
    pub rkey: String,
    pub uri: String,
    pub cid: String,
    pub value: serde_json::Value,
    pub indexed_at: DateTime<Utc>,
    pub schema_version: String,
}

/// Metadata for an uploaded media blob.
///
/// Created by uploadInit with a provisional checksum, mutated exactly once by
/// finalize to install the verified checksum and measured size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub asset_id: String,
    pub did: String,
    pub uri: String,
    pub mime_type: String,
    pub size: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpLogEntry {
    /// Assigned by the storage backend; zero before insertion.
    pub seq: i64,
    pub kind: String,
    pub reference: String,
    pub did: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Cached response for an idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyEntry {
    pub key_hash: String,
    pub request_hash: String,
    pub response_body: Vec<u8>,
    pub response_status: u16,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Filters and paging for a record listing.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub did: String,
    pub collection: Option<String>,
    pub limit: u64,
    pub cursor: Option<Cursor>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// One page of records plus the cursor for the next page, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Body of `POST /v1/repo/record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub did: String,
    pub record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Payload of a successful record creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordData {
    pub uri: String,
    pub cid: String,
    pub indexed_at: DateTime<Utc>,
}

/// Body of `POST /v1/media/uploadInit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitRequest {
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Payload of a successful uploadInit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInitData {
    pub asset_id: String,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /v1/media/finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub sha256: String,
}
