//! Event publication for the CDV write path.
//!
//! Record and media events are published at-least-once to durable JetStream
//! streams, with a short correlation-keyed deduplication window so a retried
//! request that already published does not publish again. Publication is
//! strictly post-commit and best-effort: a write never fails because its
//! event could not be delivered.

pub mod dedup;
pub mod envelope;
pub mod nats;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use cdv_core::model::{MediaAsset, Record};

pub use dedup::DedupWindow;
pub use envelope::EventEnvelope;
pub use nats::NatsPublisher;

/// Publisher seam consumed by the write coordinator.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_record_created(&self, correlation_id: &str, record: &Record) -> Result<()>;

    async fn publish_media_finalized(&self, correlation_id: &str, asset: &MediaAsset)
    -> Result<()>;
}

/// Publisher used when no broker is configured: accepts and drops everything.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish_record_created(&self, _correlation_id: &str, _record: &Record) -> Result<()> {
        Ok(())
    }

    async fn publish_media_finalized(
        &self,
        _correlation_id: &str,
        _asset: &MediaAsset,
    ) -> Result<()> {
        Ok(())
    }
}

/// Build a publisher from configuration.
///
/// Missing broker configuration or a failed initial connection installs the
/// no-op publisher; the write path must not depend on the broker being up.
pub async fn publisher_from_config(nats_url: Option<&str>) -> Arc<dyn EventPublisher> {
    let Some(url) = nats_url else {
        info!("NATS_URL not set, events disabled");
        return Arc::new(NoopPublisher);
    };
    match NatsPublisher::connect(url).await {
        Ok(publisher) => Arc::new(publisher),
        Err(err) => {
            warn!(error = %err, "NATS connect failed, events disabled");
            Arc::new(NoopPublisher)
        }
    }
}
