//! The wire envelope shared by all published events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use cdv_core::model::{MediaAsset, Record};

/// Envelope version carried on every event.
pub const ENVELOPE_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    pub payload: Value,
}

impl EventEnvelope {
    /// Envelope for a record creation; the payload carries the minimal record
    /// reference, not the record body.
    pub fn record_created(correlation_id: &str, record: &Record) -> Self {
        Self {
            kind: format!("cdv.records.{}.created", record.collection),
            version: ENVELOPE_VERSION,
            occurred_at: Utc::now(),
            correlation_id: correlation_id.to_string(),
            payload: json!({
                "uri": record.uri,
                "cid": record.cid,
                "schema_version": record.schema_version,
                "correlationId": correlation_id,
            }),
        }
    }

    pub fn media_finalized(correlation_id: &str, asset: &MediaAsset) -> Self {
        Self {
            kind: "cdv.media.finalized".to_string(),
            version: ENVELOPE_VERSION,
            occurred_at: Utc::now(),
            correlation_id: correlation_id.to_string(),
            payload: json!({
                "assetId": asset.asset_id,
                "uri": asset.uri,
                "checksum": asset.checksum,
                "size": asset.size,
                "mimeType": asset.mime_type,
                "correlationId": correlation_id,
            }),
        }
    }

    /// NATS subject for this event; identical to its type.
    pub fn subject(&self) -> String {
        self.kind.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            id: "r1".into(),
            did: "did:ra:alice".into(),
            collection: "com.registryaccord.feed.post".into(),
            rkey: "01HZX".into(),
            uri: "at://did:ra:alice/com.registryaccord.feed.post/01HZX".into(),
            cid: "cafe".into(),
            value: serde_json::json!({"text":"hi"}),
            indexed_at: Utc::now(),
            schema_version: "1.0.0".into(),
        }
    }

    #[test]
    fn record_envelope_shape() {
        let envelope = EventEnvelope::record_created("cid-1", &record());
        assert_eq!(
            envelope.subject(),
            "cdv.records.com.registryaccord.feed.post.created"
        );

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["type"], "cdv.records.com.registryaccord.feed.post.created");
        assert_eq!(wire["version"], "1.0.0");
        assert_eq!(wire["correlationId"], "cid-1");
        assert_eq!(wire["payload"]["uri"], record().uri);
        assert_eq!(wire["payload"]["schema_version"], "1.0.0");
        assert!(wire["occurredAt"].is_string());
    }

    #[test]
    fn media_envelope_shape() {
        let asset = MediaAsset {
            asset_id: "a1".into(),
            did: "did:ra:alice".into(),
            uri: "s3://bucket/dev/did:ra:alice/a1".into(),
            mime_type: "image/png".into(),
            size: 100,
            checksum: "beef".into(),
            created_at: Utc::now(),
        };
        let envelope = EventEnvelope::media_finalized("cid-2", &asset);
        assert_eq!(envelope.subject(), "cdv.media.finalized");

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["payload"]["assetId"], "a1");
        assert_eq!(wire["payload"]["mimeType"], "image/png");
        assert_eq!(wire["payload"]["size"], 100);
    }
}
