//! JetStream publisher.

use anyhow::{Context, Result, anyhow};
use async_nats::jetstream;
use async_nats::jetstream::stream::{DiscardPolicy, RetentionPolicy, StorageType};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use cdv_core::model::{MediaAsset, Record};

use crate::dedup::DedupWindow;
use crate::envelope::EventEnvelope;
use crate::EventPublisher;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub const RECORDS_STREAM: &str = "RA_RECORDS";
pub const MEDIA_STREAM: &str = "RA_MEDIA";

/// Publishes CDV events to NATS JetStream.
pub struct NatsPublisher {
    jetstream: jetstream::Context,
    record_dedup: DedupWindow,
    media_dedup: DedupWindow,
}

impl NatsPublisher {
    /// Connect and ensure both streams exist with the expected retention.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("🔄 connecting to NATS at {url}");
        let client = timeout(CONNECT_TIMEOUT, async_nats::connect(url))
            .await
            .context("NATS connect timed out")?
            .context("NATS connect failed")?;
        let jetstream = jetstream::new(client);

        ensure_stream(&jetstream, RECORDS_STREAM, "cdv.records.>").await?;
        ensure_stream(&jetstream, MEDIA_STREAM, "cdv.media.>").await?;
        info!("✅ NATS streams ready");

        Ok(Self {
            jetstream,
            record_dedup: DedupWindow::new(),
            media_dedup: DedupWindow::new(),
        })
    }

    async fn publish(&self, envelope: &EventEnvelope) -> Result<()> {
        let subject = envelope.subject();
        let payload = serde_json::to_vec(envelope)?;
        let ack = self
            .jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|err| anyhow!("publish to {subject} failed: {err}"))?;
        ack.await
            .map_err(|err| anyhow!("publish ack for {subject} failed: {err}"))?;
        debug!(subject, "event published");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish_record_created(&self, correlation_id: &str, record: &Record) -> Result<()> {
        if self.record_dedup.is_duplicate(correlation_id) {
            debug!(correlation_id, "record event suppressed by dedup window");
            return Ok(());
        }
        let envelope = EventEnvelope::record_created(correlation_id, record);
        self.publish(&envelope).await?;
        self.record_dedup.mark(correlation_id);
        Ok(())
    }

    async fn publish_media_finalized(
        &self,
        correlation_id: &str,
        asset: &MediaAsset,
    ) -> Result<()> {
        if self.media_dedup.is_duplicate(correlation_id) {
            debug!(correlation_id, "media event suppressed by dedup window");
            return Ok(());
        }
        let envelope = EventEnvelope::media_finalized(correlation_id, asset);
        self.publish(&envelope).await?;
        self.media_dedup.mark(correlation_id);
        Ok(())
    }
}

/// Create the stream if missing, or update it when its subjects drifted.
async fn ensure_stream(
    jetstream: &jetstream::Context,
    name: &str,
    subject: &str,
) -> Result<()> {
    let config = jetstream::stream::Config {
        name: name.to_string(),
        subjects: vec![subject.to_string()],
        retention: RetentionPolicy::Limits,
        max_age: STREAM_MAX_AGE,
        discard: DiscardPolicy::Old,
        storage: StorageType::File,
        ..Default::default()
    };

    match jetstream.get_stream(name).await {
        Ok(mut existing) => {
            let info = existing
                .info()
                .await
                .map_err(|err| anyhow!("stream info for {name} failed: {err}"))?;
            if info.config.subjects != config.subjects {
                warn!(stream = name, "stream subjects drifted, updating");
                jetstream
                    .update_stream(config)
                    .await
                    .map_err(|err| anyhow!("stream update for {name} failed: {err}"))?;
            }
        }
        Err(_) => {
            jetstream
                .create_stream(config)
                .await
                .map_err(|err| anyhow!("stream create for {name} failed: {err}"))?;
            info!(stream = name, subject, "created stream");
        }
    }
    Ok(())
}
