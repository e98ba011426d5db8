//! The write path: record creation and the media two-phase commit.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use cdv_core::error::DataEnvelope;
use cdv_core::model::{
    CreateRecordData, CreateRecordRequest, FinalizeRequest, IdempotencyEntry, MediaAsset,
    OpLogEntry, Record, UploadInitData, UploadInitRequest,
};
use cdv_core::{CdvError, ErrorCode, derive_cid, record_uri, sha256_hex};
use cdv_media::ObjectStoreError;
use cdv_schema::SchemaError;
use cdv_storage::StorageError;

use crate::metrics;

use super::Vault;

const IDEMPOTENCY_TTL_HOURS: i64 = 24;
const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a record create: either a fresh write or a verbatim replay of a
/// previously cached response.
pub enum CreateRecordOutcome {
    Created(CreateRecordData),
    Replayed { body: Vec<u8>, status: u16 },
}

impl Vault {
    /// `POST /v1/repo/record`.
    pub async fn create_record(
        &self,
        subject: &str,
        correlation_id: &str,
        req: CreateRecordRequest,
    ) -> Result<CreateRecordOutcome, CdvError> {
        let Some(value) = req.record.clone() else {
            return Err(CdvError::validation(
                "collection, did, and record are required",
            ));
        };
        if req.collection.is_empty() || req.did.is_empty() {
            return Err(CdvError::validation(
                "collection, did, and record are required",
            ));
        }
        if req.did != subject {
            return Err(CdvError::new(
                ErrorCode::DidMismatch,
                "did must match token subject",
            ));
        }

        // Idempotency probe before any side effect: an entry with the same
        // request hash is replayed byte for byte, a different payload under
        // the same key is a conflict.
        let key_hash = req
            .idempotency_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| sha256_hex(k.as_bytes()));
        let request_hash = serde_json::to_vec(&req)
            .map(|canonical| sha256_hex(&canonical))
            .unwrap_or_default();
        if let Some(key_hash) = &key_hash {
            match self.store.get_idempotent(key_hash).await {
                Ok(entry) if entry.request_hash == request_hash => {
                    return Ok(CreateRecordOutcome::Replayed {
                        body: entry.response_body,
                        status: entry.response_status,
                    });
                }
                Ok(_) => {
                    return Err(CdvError::conflict(
                        "idempotency key conflict: different payload for same key",
                    ));
                }
                Err(StorageError::NotFound) => {}
                Err(err) => warn!(error = %err, "idempotency probe failed, proceeding"),
            }
        }

        self.schemas
            .validate(&req.collection, &value)
            .map_err(map_schema_error)?;

        let resolved = self.schemas.resolve_version(&req.collection).await;
        if resolved.deprecated {
            if self.settings.reject_deprecated_schemas {
                return Err(CdvError::new(
                    ErrorCode::SchemaReject,
                    format!(
                        "schema version {} for {} is deprecated",
                        resolved.version, req.collection
                    ),
                ));
            }
            warn!(
                collection = %req.collection,
                version = %resolved.version,
                "using deprecated schema version"
            );
        }
        let schema_version = resolved.version;

        self.ensure_account(&req.did).await?;

        let rkey = self.minter.mint();
        let uri = record_uri(&req.did, &req.collection, &rkey);
        let cid = derive_cid(&value);
        let indexed_at = req.created_at.unwrap_or_else(Utc::now);

        let record = Record {
            id: Uuid::new_v4().to_string(),
            did: req.did.clone(),
            collection: req.collection.clone(),
            rkey,
            uri: uri.clone(),
            cid: cid.clone(),
            value,
            indexed_at,
            schema_version,
        };

        match self.store.create_record(record.clone()).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                return Err(CdvError::conflict("record already exists"));
            }
            Err(err) => {
                error!(uri = %record.uri, error = %err, "record insert failed");
                return Err(CdvError::internal("failed to create record"));
            }
        }
        metrics::record_created();

        // The record is committed; everything below is post-commit and must
        // not fail the request (except an idempotency payload conflict).
        if let Err(err) = self
            .events
            .publish_record_created(correlation_id, &record)
            .await
        {
            warn!(uri = %record.uri, error = %err, "record event publish failed");
        } else {
            metrics::event_published("record");
        }

        self.audit(OpLogEntry {
            seq: 0,
            kind: "record.created".to_string(),
            reference: record.uri.clone(),
            did: record.did.clone(),
            payload: json!({
                "uri": record.uri,
                "cid": record.cid,
                "collection": record.collection,
                "schemaVersion": record.schema_version,
            }),
            occurred_at: Utc::now(),
        })
        .await;

        let data = CreateRecordData {
            uri,
            cid,
            indexed_at,
        };

        if let Some(key_hash) = key_hash {
            self.cache_idempotent(key_hash, request_hash, &data).await?;
        }

        Ok(CreateRecordOutcome::Created(data))
    }

    /// Cache the response body under the idempotency key. A conflicting
    /// payload for the same key is surfaced to the caller; any other failure
    /// is best-effort.
    async fn cache_idempotent(
        &self,
        key_hash: String,
        request_hash: String,
        data: &CreateRecordData,
    ) -> Result<(), CdvError> {
        let Ok(body) = serde_json::to_vec(&DataEnvelope { data }) else {
            warn!("idempotent response serialization failed");
            return Ok(());
        };
        let now = Utc::now();
        let entry = IdempotencyEntry {
            key_hash,
            request_hash,
            response_body: body,
            response_status: 200,
            created_at: now,
            expires_at: now + ChronoDuration::hours(IDEMPOTENCY_TTL_HOURS),
        };
        match self.store.store_idempotent(entry).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict) => Err(CdvError::conflict(
                "idempotency key conflict: different payload for same key",
            )),
            Err(err) => {
                warn!(error = %err, "idempotent response store failed");
                Ok(())
            }
        }
    }

    /// `POST /v1/media/uploadInit`: reserve the asset and presign the upload.
    pub async fn upload_init(
        &self,
        subject: &str,
        req: UploadInitRequest,
    ) -> Result<UploadInitData, CdvError> {
        if req.did.is_empty() || req.mime_type.is_empty() || req.size <= 0 {
            return Err(CdvError::validation(
                "did, mimeType, and size are required",
            ));
        }
        if req.size > self.limits.max_size {
            return Err(CdvError::new(
                ErrorCode::MediaSize,
                format!("media size exceeds limit of {} bytes", self.limits.max_size),
            ));
        }
        if !self.limits.allowed_mime_types.contains(&req.mime_type) {
            return Err(CdvError::new(
                ErrorCode::MediaType,
                format!("media type {} is not allowed", req.mime_type),
            ));
        }
        if req.did != subject {
            return Err(CdvError::new(
                ErrorCode::DidMismatch,
                "did must match token subject",
            ));
        }

        self.ensure_account(&req.did).await?;

        let asset_id = Uuid::new_v4().to_string();
        let object_key = self.object_key(&req.did, &asset_id, req.filename.as_deref());
        let uri = format!("s3://{}/{}", self.settings.bucket, object_key);

        let asset = MediaAsset {
            asset_id: asset_id.clone(),
            did: req.did.clone(),
            uri,
            mime_type: req.mime_type.clone(),
            size: req.size,
            checksum: req.sha256.clone().unwrap_or_default(),
            created_at: Utc::now(),
        };
        match self.store.create_media_asset(asset).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                return Err(CdvError::conflict("asset already exists"));
            }
            Err(err) => {
                error!(asset_id = %asset_id, error = %err, "media asset insert failed");
                return Err(CdvError::internal("failed to create media asset"));
            }
        }

        let expires_at = Utc::now() + ChronoDuration::seconds(UPLOAD_URL_TTL.as_secs() as i64);
        let upload_url = match &self.objects {
            Some(objects) => objects
                .presign_put(&object_key, UPLOAD_URL_TTL)
                .await
                .map_err(|err| {
                    error!(asset_id = %asset_id, error = %err, "presign failed");
                    CdvError::internal("failed to generate upload url")
                })?,
            // Devstack only: no object store configured.
            None => format!("http://localhost:8081/upload/{asset_id}"),
        };

        Ok(UploadInitData {
            asset_id,
            upload_url,
            expires_at,
        })
    }

    /// `POST /v1/media/finalize`: verify the uploaded object and commit the
    /// checksum and measured size.
    pub async fn finalize_media(
        &self,
        subject: &str,
        correlation_id: &str,
        req: FinalizeRequest,
    ) -> Result<MediaAsset, CdvError> {
        if req.asset_id.is_empty() || req.sha256.is_empty() {
            return Err(CdvError::validation("assetId and sha256 are required"));
        }

        let mut asset = match self.store.get_media_asset(&req.asset_id).await {
            Ok(asset) => asset,
            Err(StorageError::NotFound) => {
                return Err(CdvError::not_found("asset not found"));
            }
            Err(err) => {
                error!(asset_id = %req.asset_id, error = %err, "media asset lookup failed");
                return Err(CdvError::internal("failed to get media asset"));
            }
        };
        if asset.did != subject {
            return Err(CdvError::new(
                ErrorCode::DidMismatch,
                "did must match token subject",
            ));
        }

        if let Some(objects) = &self.objects {
            let prefix = format!("s3://{}/", self.settings.bucket);
            let object_key = asset
                .uri
                .strip_prefix(&prefix)
                .unwrap_or(&asset.uri)
                .to_string();

            let verification =
                tokio::time::timeout(VERIFY_TIMEOUT, objects.verify(&object_key, &req.sha256))
                    .await
                    .map_err(|_| {
                        error!(asset_id = %asset.asset_id, "media verification timed out");
                        CdvError::internal("failed to verify media object")
                    })?
                    .map_err(|err| match err {
                        // A missing object is a failed verification from the
                        // caller's point of view, not a missing resource.
                        ObjectStoreError::NotFound => {
                            CdvError::new(ErrorCode::MediaChecksum, "checksum verification failed")
                        }
                        ObjectStoreError::Backend(err) => {
                            error!(asset_id = %asset.asset_id, error = %err, "media verification failed");
                            CdvError::internal("failed to verify media object")
                        }
                    })?;
            if !verification.matches {
                return Err(CdvError::new(
                    ErrorCode::MediaChecksum,
                    "checksum verification failed",
                ));
            }
            if verification.size > self.limits.max_size {
                return Err(CdvError::new(
                    ErrorCode::MediaSize,
                    format!(
                        "measured media size exceeds limit of {} bytes",
                        self.limits.max_size
                    ),
                ));
            }
            asset.size = verification.size;
        }

        asset.checksum = req.sha256.clone();
        match self.store.update_media_asset(asset.clone()).await {
            Ok(()) => {}
            Err(StorageError::NotFound) => {
                return Err(CdvError::not_found("asset not found"));
            }
            Err(err) => {
                error!(asset_id = %asset.asset_id, error = %err, "media asset update failed");
                return Err(CdvError::internal("failed to update media asset"));
            }
        }
        metrics::media_finalized();

        if let Err(err) = self
            .events
            .publish_media_finalized(correlation_id, &asset)
            .await
        {
            warn!(asset_id = %asset.asset_id, error = %err, "media event publish failed");
        } else {
            metrics::event_published("media");
        }

        self.audit(OpLogEntry {
            seq: 0,
            kind: "media.finalized".to_string(),
            reference: asset.uri.clone(),
            did: asset.did.clone(),
            payload: json!({
                "assetId": asset.asset_id,
                "checksum": asset.checksum,
                "size": asset.size,
            }),
            occurred_at: Utc::now(),
        })
        .await;

        Ok(asset)
    }

    fn object_key(&self, did: &str, asset_id: &str, filename: Option<&str>) -> String {
        match filename.filter(|f| !f.is_empty()) {
            Some(filename) => format!("{}/{did}/{asset_id}/{filename}", self.settings.env),
            None => format!("{}/{did}/{asset_id}", self.settings.env),
        }
    }
}

fn map_schema_error(err: SchemaError) -> CdvError {
    match err {
        SchemaError::UnsupportedCollection(collection) => {
            CdvError::validation(format!("unsupported collection: {collection}"))
        }
        SchemaError::Rejected {
            collection,
            violations,
        } => CdvError::new(
            ErrorCode::SchemaReject,
            format!("record does not match the {collection} schema"),
        )
        .with_details(json!(violations)),
        SchemaError::Compile { .. } => CdvError::internal("schema validator unavailable"),
    }
}
