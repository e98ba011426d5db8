//! `cdvd`: the Creator Data Vault daemon.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdv_auth::{IdentityClient, JwksClient, TokenVerifier};
use cdv_media::{ObjectStore, S3ObjectStore};
use cdv_schema::{SchemaRegistry, VersionResolver};
use cdv_server::http::{AppState, router};
use cdv_server::vault::{MediaLimits, Vault, VaultSettings};
use cdv_server::{Config, metrics};
use cdv_storage::{MemoryStore, RelationalStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("config load failed")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if config.env == "dev" {
                    "debug".into()
                } else {
                    "info".into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    metrics::init().context("metrics registration failed")?;

    info!(env = %config.env, port = config.port, "starting cdvd");

    // Storage: relational when a DSN is configured, in-memory otherwise.
    let store: Arc<dyn Store> = match &config.db_dsn {
        Some(dsn) => Arc::new(
            RelationalStore::connect(dsn)
                .await
                .context("storage dial failed")?,
        ),
        None => {
            warn!("DB_DSN not set, using in-memory storage");
            Arc::new(MemoryStore::new())
        }
    };

    let events = cdv_events::publisher_from_config(config.nats_url.as_deref()).await;

    let resolver = VersionResolver::new(
        config.specs_url.clone(),
        std::env::temp_dir().join("registryaccord-specs-cache"),
    );
    let schemas = SchemaRegistry::new()
        .context("schema validator initialization failed")?
        .with_resolver(resolver);

    let objects: Option<Arc<dyn ObjectStore>> = match &config.s3 {
        Some(settings) => {
            let store = S3ObjectStore::connect(settings.clone())
                .await
                .context("object store initialization failed")?;
            info!(bucket = %settings.bucket, "object store configured");
            Some(Arc::new(store))
        }
        None => {
            warn!("S3 not configured, media uploads run in stub mode");
            None
        }
    };

    let identity = config.identity_url.as_ref().map(|url| {
        info!(url = %url, "identity service configured");
        IdentityClient::new(url.clone())
    });

    let jwks_url = format!(
        "{}/.well-known/jwks.json",
        config.jwt_issuer.trim_end_matches('/')
    );
    let verifier = Arc::new(TokenVerifier::new(
        JwksClient::new(jwks_url),
        config.jwt_issuer.clone(),
        config.jwt_audience.clone(),
    ));

    let vault = Arc::new(Vault::new(
        store,
        events,
        schemas,
        objects,
        identity,
        MediaLimits {
            max_size: config.max_media_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
        },
        VaultSettings {
            env: config.env.clone(),
            bucket: config.media_bucket(),
            reject_deprecated_schemas: config.reject_deprecated_schemas,
        },
    ));

    let app = router(AppState { vault, verifier }, &config.cors_allowed_origins);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind failed on {addr}"))?;
    info!(addr = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    info!("server exited");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("shutdown signal handler failed to install");
        return;
    }
    info!("shutdown signal received");
}
