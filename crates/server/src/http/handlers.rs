//! Route handlers. Thin shims: decode, delegate to the vault, encode.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};

use cdv_core::CdvError;
use cdv_core::error::DataEnvelope;
use cdv_core::model::{CreateRecordRequest, FinalizeRequest, UploadInitRequest};

use crate::vault::{CreateRecordOutcome, ListRecordsParams};

use super::middleware::{CorrelationId, Subject};
use super::{AppState, respond::AppError};

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> Response {
    if state.vault.storage_ready().await {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

pub async fn metrics() -> Response {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "encode failed").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

pub async fn create_record(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(subject): Extension<Subject>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: CreateRecordRequest = decode_json(&body, &correlation)?;
    let outcome = state
        .vault
        .create_record(&subject.0, &correlation.0, request)
        .await
        .map_err(|err| AppError(err.with_correlation(&correlation.0)))?;

    match outcome {
        CreateRecordOutcome::Created(data) => {
            Ok((StatusCode::OK, Json(DataEnvelope { data })).into_response())
        }
        CreateRecordOutcome::Replayed { body, status } => Ok((
            StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()),
    }
}

pub async fn list_records(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(params): Query<ListRecordsParams>,
) -> Result<Response, AppError> {
    let page = state
        .vault
        .list_records(params)
        .await
        .map_err(|err| AppError(err.with_correlation(&correlation.0)))?;
    Ok((StatusCode::OK, Json(DataEnvelope { data: page })).into_response())
}

pub async fn upload_init(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(subject): Extension<Subject>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: UploadInitRequest = decode_json(&body, &correlation)?;
    let data = state
        .vault
        .upload_init(&subject.0, request)
        .await
        .map_err(|err| AppError(err.with_correlation(&correlation.0)))?;
    Ok((StatusCode::OK, Json(DataEnvelope { data })).into_response())
}

pub async fn finalize_media(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(subject): Extension<Subject>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: FinalizeRequest = decode_json(&body, &correlation)?;
    let asset = state
        .vault
        .finalize_media(&subject.0, &correlation.0, request)
        .await
        .map_err(|err| AppError(err.with_correlation(&correlation.0)))?;
    Ok((StatusCode::OK, Json(DataEnvelope { data: asset })).into_response())
}

pub async fn media_meta(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(asset_id): Path<String>,
) -> Result<Response, AppError> {
    let asset = state
        .vault
        .media_meta(&asset_id)
        .await
        .map_err(|err| AppError(err.with_correlation(&correlation.0)))?;
    Ok((StatusCode::OK, Json(DataEnvelope { data: asset })).into_response())
}

fn decode_json<T: serde::de::DeserializeOwned>(
    body: &[u8],
    correlation: &CorrelationId,
) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|_| AppError(CdvError::validation("invalid json").with_correlation(&correlation.0)))
}
