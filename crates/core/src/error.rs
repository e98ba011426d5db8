//! Stable error taxonomy for the CDV service.
//!
//! Every user-visible failure maps to exactly one [`ErrorCode`], which in turn
//! maps to exactly one HTTP status. New failure conditions must reuse an
//! existing code.

use serde::Serialize;
use std::fmt;

/// Closed set of machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation,
    SchemaReject,
    BadRequest,
    CursorInvalid,
    MediaSize,
    MediaType,
    MediaChecksum,
    Authn,
    JwtInvalid,
    JwtExpired,
    JwtMalformed,
    Authz,
    DidMismatch,
    NotFound,
    Conflict,
    RateLimit,
    Internal,
    Unavailable,
    NotImplemented,
}

impl ErrorCode {
    /// Wire form of the code, stable across releases.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "CDV_VALIDATION",
            ErrorCode::SchemaReject => "CDV_SCHEMA_REJECT",
            ErrorCode::BadRequest => "CDV_BAD_REQUEST",
            ErrorCode::CursorInvalid => "CDV_CURSOR_INVALID",
            ErrorCode::MediaSize => "CDV_MEDIA_SIZE",
            ErrorCode::MediaType => "CDV_MEDIA_TYPE",
            ErrorCode::MediaChecksum => "CDV_MEDIA_CHECKSUM",
            ErrorCode::Authn => "CDV_AUTHN",
            ErrorCode::JwtInvalid => "CDV_JWT_INVALID",
            ErrorCode::JwtExpired => "CDV_JWT_EXPIRED",
            ErrorCode::JwtMalformed => "CDV_JWT_MALFORMED",
            ErrorCode::Authz => "CDV_AUTHZ",
            ErrorCode::DidMismatch => "CDV_DID_MISMATCH",
            ErrorCode::NotFound => "CDV_NOT_FOUND",
            ErrorCode::Conflict => "CDV_CONFLICT",
            ErrorCode::RateLimit => "CDV_RATE_LIMIT",
            ErrorCode::Internal => "CDV_INTERNAL",
            ErrorCode::Unavailable => "CDV_UNAVAILABLE",
            ErrorCode::NotImplemented => "CDV_NOT_IMPLEMENTED",
        }
    }

    /// HTTP status carried by responses with this code.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Validation
            | ErrorCode::SchemaReject
            | ErrorCode::BadRequest
            | ErrorCode::CursorInvalid
            | ErrorCode::MediaSize
            | ErrorCode::MediaType
            | ErrorCode::MediaChecksum => 400,
            ErrorCode::Authn
            | ErrorCode::JwtInvalid
            | ErrorCode::JwtExpired
            | ErrorCode::JwtMalformed => 401,
            ErrorCode::Authz | ErrorCode::DidMismatch => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::RateLimit => 429,
            ErrorCode::Unavailable => 503,
            ErrorCode::NotImplemented => 501,
            ErrorCode::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A user-visible error.
///
/// Messages are lowercase, carry no trailing punctuation and never contain
/// secrets. `correlation_id` is filled in at the HTTP boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CdvError {
    pub code: ErrorCode,
    pub message: String,
    pub correlation_id: String,
    pub details: Option<serde_json::Value>,
}

impl CdvError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: String::new(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

/// Success envelope: `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T: Serialize> {
    pub data: T,
}

/// Error envelope: `{"error": {code, message, correlationId, details?}}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<CdvError> for ErrorEnvelope {
    fn from(err: CdvError) -> Self {
        ErrorEnvelope {
            error: ErrorBody {
                code: err.code.as_str(),
                message: err.message,
                correlation_id: err.correlation_id,
                details: err.details,
            },
        }
    }
}
