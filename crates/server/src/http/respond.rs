//! Error-to-response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use cdv_core::CdvError;
use cdv_core::error::ErrorEnvelope;

/// Newtype giving [`CdvError`] an HTTP rendering.
pub struct AppError(pub CdvError);

impl From<CdvError> for AppError {
    fn from(err: CdvError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorEnvelope::from(self.0))).into_response()
    }
}
