//! HTTP surface and coordinators for the Creator Data Vault.
//!
//! The binary wires configuration into explicit collaborators (storage,
//! events, schemas, object store, token verifier) and hands them to the
//! [`vault::Vault`] coordinator; handlers consume only injected state and
//! never read the environment.

pub mod config;
pub mod http;
pub mod metrics;
pub mod vault;

pub use config::Config;
pub use http::{AppState, router};
pub use vault::{MediaLimits, Vault, VaultSettings};
