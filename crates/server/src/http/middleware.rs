//! Request envelope middleware: correlation ids, bearer authentication and
//! completion logging.

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use cdv_core::{CdvError, ErrorCode};

use crate::metrics;

use super::{AppState, respond::AppError};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Correlation id of the current request, available as a request extension.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// Authenticated DID, attached by [`authenticate`]; also surfaced as a
/// response extension for the completion log.
#[derive(Debug, Clone)]
pub struct Subject(pub String);

/// Accept or mint the correlation id and echo it on the response.
pub async fn correlation(mut req: Request, next: Next) -> Response {
    let correlation_id = req
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Bearer authentication for mutating routes and the media surface.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|c| c.0.clone())
        .unwrap_or_default();

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if header.is_empty() {
        return AppError(
            CdvError::new(ErrorCode::Authn, "missing authorization header")
                .with_correlation(correlation_id),
        )
        .into_response();
    }
    let Some(token) = header.strip_prefix("Bearer ") else {
        return AppError(
            CdvError::new(ErrorCode::Authn, "invalid authorization header format")
                .with_correlation(correlation_id),
        )
        .into_response();
    };

    match state.verifier.verify(token).await {
        Ok(verified) => {
            let subject = Subject(verified.subject);
            req.extensions_mut().insert(subject.clone());
            let mut response = next.run(req).await;
            response.extensions_mut().insert(subject);
            response
        }
        Err(err) => AppError(err.with_correlation(correlation_id)).into_response(),
    }
}

/// Completion log and request metrics for every route.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(|c| c.0.clone())
        .unwrap_or_default();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let duration = start.elapsed();
    if let Some(counter) = metrics::http_requests() {
        counter
            .with_label_values(&[method.as_str(), &path, &status.to_string()])
            .inc();
    }
    if let Some(histogram) = metrics::http_duration() {
        histogram
            .with_label_values(&[method.as_str(), &path])
            .observe(duration.as_secs_f64());
    }

    match response.extensions().get::<Subject>() {
        Some(subject) => info!(
            method = %method,
            path = %path,
            status,
            duration_ms = duration.as_millis() as u64,
            correlation_id = %correlation_id,
            subject = %subject.0,
            "request completed"
        ),
        None => info!(
            method = %method,
            path = %path,
            status,
            duration_ms = duration.as_millis() as u64,
            correlation_id = %correlation_id,
            "request completed"
        ),
    }

    response
}
