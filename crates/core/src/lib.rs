//! Core domain types for the Creator Data Vault.
//!
//! This crate is transport- and backend-free: it defines the data model,
//! the stable error taxonomy, cursor encoding and record-key minting that
//! every other CDV crate builds on.

pub mod collections;
pub mod cursor;
pub mod error;
pub mod model;
pub mod rkey;

pub use cursor::Cursor;
pub use error::{CdvError, ErrorCode};
pub use rkey::RkeyMinter;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Content identifier for a record: the hash of its canonical JSON value.
///
/// `serde_json` serializes object keys in sorted order, so two structurally
/// equal values always produce the same cid.
pub fn derive_cid(value: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(value).unwrap_or_default();
    sha256_hex(&canonical)
}

/// Record URI of the form `at://<did>/<collection>/<rkey>`.
pub fn record_uri(did: &str, collection: &str, rkey: &str) -> String {
    format!("at://{did}/{collection}/{rkey}")
}
