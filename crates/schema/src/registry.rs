//! Compiled validators for the supported collections.

use cdv_core::collections;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::resolver::{DEFAULT_VERSION, ResolvedVersion, VersionResolver};

/// Schema documents for the closed collection set.
///
/// These mirror the published RegistryAccord record schemas at their baseline
/// version.
const SCHEMAS: [(&str, &str); 8] = [
    (
        collections::FEED_POST,
        r#"{"type":"object","required":["text","createdAt","authorDid"],"properties":{"text":{"type":"string","maxLength":2048},"createdAt":{"type":"string"},"authorDid":{"type":"string"}}}"#,
    ),
    (
        collections::PROFILE,
        r#"{"type":"object","required":["displayName"],"properties":{"displayName":{"type":"string","maxLength":64},"bio":{"type":"string","maxLength":256}}}"#,
    ),
    (
        collections::GRAPH_FOLLOW,
        r#"{"type":"object","required":["subject"],"properties":{"subject":{"type":"string"}}}"#,
    ),
    (
        collections::FEED_LIKE,
        r#"{"type":"object","required":["subject"],"properties":{"subject":{"type":"string"}}}"#,
    ),
    (
        collections::FEED_COMMENT,
        r#"{"type":"object","required":["text","subject"],"properties":{"text":{"type":"string","maxLength":2048},"subject":{"type":"string"}}}"#,
    ),
    (
        collections::FEED_REPOST,
        r#"{"type":"object","required":["subject"],"properties":{"subject":{"type":"string"}}}"#,
    ),
    (
        collections::MODERATION_FLAG,
        r#"{"type":"object","required":["subject","reason"],"properties":{"subject":{"type":"string"},"reason":{"type":"string","maxLength":256}}}"#,
    ),
    (
        collections::MEDIA_ASSET,
        r#"{"type":"object","required":["mimeType","size","checksum"],"properties":{"mimeType":{"type":"string"},"size":{"type":"integer"},"checksum":{"type":"string"},"filename":{"type":"string"}}}"#,
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported collection: {0}")]
    UnsupportedCollection(String),
    #[error("record does not match the {collection} schema")]
    Rejected {
        collection: String,
        violations: Vec<String>,
    },
    #[error("invalid schema for {collection}: {message}")]
    Compile { collection: String, message: String },
}

/// Holds one compiled validator per supported collection.
pub struct SchemaRegistry {
    validators: HashMap<&'static str, Validator>,
    resolver: Option<VersionResolver>,
}

impl SchemaRegistry {
    /// Compile all collection schemas. Failure here is fatal at startup.
    pub fn new() -> Result<Self, SchemaError> {
        let mut validators = HashMap::with_capacity(SCHEMAS.len());
        for (collection, raw) in SCHEMAS {
            let document: Value =
                serde_json::from_str(raw).map_err(|err| SchemaError::Compile {
                    collection: collection.to_string(),
                    message: err.to_string(),
                })?;
            let validator =
                jsonschema::validator_for(&document).map_err(|err| SchemaError::Compile {
                    collection: collection.to_string(),
                    message: err.to_string(),
                })?;
            validators.insert(collection, validator);
        }
        Ok(Self {
            validators,
            resolver: None,
        })
    }

    pub fn with_resolver(mut self, resolver: VersionResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Validate a record value against its collection schema.
    ///
    /// Returns the baseline schema version used for validation. Rejections
    /// carry the full list of violation messages.
    pub fn validate(&self, collection: &str, value: &Value) -> Result<String, SchemaError> {
        if !collections::is_supported(collection) {
            return Err(SchemaError::UnsupportedCollection(collection.to_string()));
        }
        let validator = self
            .validators
            .get(collection)
            .ok_or_else(|| SchemaError::UnsupportedCollection(collection.to_string()))?;

        let violations: Vec<String> = validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            return Err(SchemaError::Rejected {
                collection: collection.to_string(),
                violations,
            });
        }
        Ok(DEFAULT_VERSION.to_string())
    }

    /// Resolve the current version for a collection.
    ///
    /// Resolver failures fall back to the compiled-in default so writes never
    /// depend on index availability.
    pub async fn resolve_version(&self, collection: &str) -> ResolvedVersion {
        let Some(resolver) = &self.resolver else {
            return ResolvedVersion::fallback();
        };
        match resolver.resolve(collection).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(collection, error = %err, "schema version resolution failed, using default");
                ResolvedVersion::fallback()
            }
        }
    }
}
