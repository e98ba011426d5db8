//! The read path: record listing and media metadata lookup.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use cdv_core::model::{ListPage, ListQuery, MediaAsset};
use cdv_core::{CdvError, Cursor, ErrorCode};
use cdv_storage::{DEFAULT_LIST_LIMIT, StorageError, clamp_limit};

use super::Vault;

/// Raw query parameters of `GET /v1/repo/listRecords`.
///
/// Timestamps and the limit are forgiving: unparseable values fall back to
/// no-filter/default. The cursor is not: an undecodable cursor is an error.
#[derive(Debug, Default, Deserialize)]
pub struct ListRecordsParams {
    pub did: Option<String>,
    pub collection: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
}

impl Vault {
    /// `GET /v1/repo/listRecords`.
    pub async fn list_records(&self, params: ListRecordsParams) -> Result<ListPage, CdvError> {
        let did = params
            .did
            .filter(|d| !d.is_empty())
            .ok_or_else(|| CdvError::validation("did is required"))?;

        let limit = params
            .limit
            .as_deref()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(clamp_limit)
            .unwrap_or(DEFAULT_LIST_LIMIT);

        let cursor = match params.cursor.filter(|c| !c.is_empty()) {
            None => None,
            Some(raw) => Some(
                Cursor::decode(&raw)
                    .map_err(|_| CdvError::new(ErrorCode::CursorInvalid, "invalid cursor"))?,
            ),
        };

        let query = ListQuery {
            did,
            collection: params.collection.filter(|c| !c.is_empty()),
            limit,
            cursor,
            since: parse_rfc3339(params.since.as_deref()),
            until: parse_rfc3339(params.until.as_deref()),
        };

        self.store.list_records(query).await.map_err(|err| {
            error!(error = %err, "record listing failed");
            CdvError::internal("failed to list records")
        })
    }

    /// `GET /v1/media/{assetId}/meta`.
    pub async fn media_meta(&self, asset_id: &str) -> Result<MediaAsset, CdvError> {
        if asset_id.is_empty() {
            return Err(CdvError::validation("assetId is required"));
        }
        match self.store.get_media_asset(asset_id).await {
            Ok(asset) => Ok(asset),
            Err(StorageError::NotFound) => Err(CdvError::not_found("asset not found")),
            Err(err) => {
                error!(asset_id, error = %err, "media asset lookup failed");
                Err(CdvError::internal("failed to get media asset"))
            }
        }
    }
}

fn parse_rfc3339(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|t| t.with_timezone(&Utc))
}
