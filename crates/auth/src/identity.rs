//! Client for the RegistryAccord identity service.
//!
//! DID creation and resolution are delegated to a separate service; the vault
//! only asks whether a DID exists before provisioning a new account.

use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// An identity record as returned by the identity service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub did: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity not found")]
    NotFound,
    #[error("identity request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity service returned status {0}")]
    Status(u16),
}

pub struct IdentityClient {
    base: String,
    http: reqwest::Client,
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self {
            base: base_url.into(),
            http,
        }
    }

    /// Resolve a DID to its identity record.
    pub async fn resolve(&self, did: &str) -> Result<IdentityRecord, IdentityError> {
        let url = format!(
            "{}/xrpc/com.registryaccord.identity.get",
            self.base.trim_end_matches('/')
        );
        let response = self.http.get(url).query(&[("did", did)]).send().await?;
        match response.status().as_u16() {
            200 => Ok(response.json::<IdentityRecord>().await?),
            404 => Err(IdentityError::NotFound),
            status => Err(IdentityError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_record_parses() {
        let rec: IdentityRecord = serde_json::from_str(
            r#"{"did":"did:ra:alice","publicKey":"ab","createdAt":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(rec.did, "did:ra:alice");
        assert_eq!(rec.public_key, "ab");
    }
}
