//! The vault coordinators.
//!
//! [`Vault`] owns the injected collaborators and implements the write path
//! (record create, media two-phase commit) in [`write`] and the read path
//! (listing, metadata lookup) in [`read`].

pub mod read;
pub mod write;

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use cdv_auth::IdentityClient;
use cdv_auth::identity::IdentityError;
use cdv_core::model::OpLogEntry;
use cdv_core::{CdvError, RkeyMinter};
use cdv_events::EventPublisher;
use cdv_media::ObjectStore;
use cdv_schema::SchemaRegistry;
use cdv_storage::{StorageError, Store};

pub use read::ListRecordsParams;
pub use write::CreateRecordOutcome;

/// Limits applied to media uploads.
#[derive(Debug, Clone)]
pub struct MediaLimits {
    pub max_size: i64,
    pub allowed_mime_types: Vec<String>,
}

/// Static facts the coordinators need beyond their collaborators.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    /// Deployment environment, the first segment of every object key.
    pub env: String,
    /// Bucket media URIs are composed against; empty in stub mode.
    pub bucket: String,
    pub reject_deprecated_schemas: bool,
}

pub struct Vault {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
    schemas: SchemaRegistry,
    objects: Option<Arc<dyn ObjectStore>>,
    identity: Option<IdentityClient>,
    minter: RkeyMinter,
    limits: MediaLimits,
    settings: VaultSettings,
}

impl Vault {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventPublisher>,
        schemas: SchemaRegistry,
        objects: Option<Arc<dyn ObjectStore>>,
        identity: Option<IdentityClient>,
        limits: MediaLimits,
        settings: VaultSettings,
    ) -> Self {
        Self {
            store,
            events,
            schemas,
            objects,
            identity,
            minter: RkeyMinter::new(),
            limits,
            settings,
        }
    }

    /// Bounded readiness probe: a sentinel lookup that reaches the backend.
    /// `NotFound` is the healthy answer; only transport-level failures and
    /// timeouts count as not ready.
    pub async fn storage_ready(&self) -> bool {
        let probe = tokio::time::timeout(
            Duration::from_secs(5),
            self.store.get_account("health-check"),
        )
        .await;
        matches!(probe, Ok(Ok(_)) | Ok(Err(StorageError::NotFound)))
    }

    /// Create the account if it does not exist yet, consulting the identity
    /// service first when one is configured. A concurrent creator winning the
    /// race is not an error.
    async fn ensure_account(&self, did: &str) -> Result<(), CdvError> {
        match self.store.get_account(did).await {
            Ok(_) => return Ok(()),
            Err(StorageError::NotFound) => {}
            Err(err) => {
                error!(did, error = %err, "account lookup failed");
                return Err(CdvError::internal("failed to check account"));
            }
        }

        if let Some(identity) = &self.identity {
            match identity.resolve(did).await {
                Ok(_) => {}
                Err(IdentityError::NotFound) => {
                    return Err(CdvError::validation("did is not registered"));
                }
                Err(err) => {
                    // The identity service being down must not block writes.
                    warn!(did, error = %err, "identity lookup failed, proceeding");
                }
            }
        }

        match self.store.create_account(did).await {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict) => Ok(()),
            Err(err) => {
                error!(did, error = %err, "account creation failed");
                Err(CdvError::internal("failed to create account"))
            }
        }
    }

    /// Best-effort audit append; failures are warnings.
    async fn audit(&self, entry: OpLogEntry) {
        if let Err(err) = self.store.append_op(entry).await {
            warn!(error = %err, "op log append failed");
        }
    }
}
