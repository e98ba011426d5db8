//! Opaque pagination cursors.
//!
//! A cursor is the base64url encoding of a JSON object
//! `{"lastIndexedAt": ..., "lastRKey": ...}`. Clients treat it as opaque; it
//! must round-trip across process restarts, so the timestamp is carried as an
//! RFC 3339 string rather than anything process-local.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the last returned row in the `(indexed_at DESC, rkey ASC)`
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub last_indexed_at: DateTime<Utc>,
    pub last_r_key: String,
}

/// The cursor string did not decode or did not parse.
#[derive(Debug, thiserror::Error)]
#[error("invalid cursor")]
pub struct CursorDecodeError;

impl Cursor {
    pub fn new(last_indexed_at: DateTime<Utc>, last_rkey: impl Into<String>) -> Self {
        Self {
            last_indexed_at,
            last_r_key: last_rkey.into(),
        }
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, CursorDecodeError> {
        let bytes = URL_SAFE.decode(raw).map_err(|_| CursorDecodeError)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorDecodeError)
    }
}
