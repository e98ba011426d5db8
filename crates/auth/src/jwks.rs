//! JWKS fetch and caching.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A JSON Web Key as advertised by the identity issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub kid: String,
    #[serde(default, rename = "use")]
    pub key_use: String,
    #[serde(default)]
    pub alg: String,
    #[serde(default)]
    pub crv: String,
    #[serde(default)]
    pub x: String,
}

/// A JSON Web Key Set document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwks {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("jwks fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("jwks fetch returned status {0}")]
    Status(u16),
    #[error("no jwks available")]
    Empty,
}

struct CachedJwks {
    jwks: Jwks,
    fetched_at: Instant,
}

/// Fetches and caches the issuer's JWKS document.
///
/// A single document is cached for five minutes. Refreshes go through the
/// write lock with a double-checked re-read, so concurrent refreshes coalesce
/// into one fetch. A failed fetch leaves the previous document in place.
pub struct JwksClient {
    url: String,
    http: Option<reqwest::Client>,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksClient {
    pub fn new(url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .ok();
        if http.is_none() {
            warn!("failed to build jwks http client; token verification will fail");
        }
        Self {
            url: url.into(),
            http,
            cache: RwLock::new(None),
        }
    }

    /// A client preloaded with a fixed key set and no remote endpoint.
    pub fn with_static_keys(jwks: Jwks) -> Self {
        Self {
            url: String::new(),
            http: None,
            cache: RwLock::new(Some(CachedJwks {
                jwks,
                fetched_at: Instant::now(),
            })),
        }
    }

    /// Look up a key by `kid`.
    ///
    /// A miss forces one refresh past the TTL before giving up, so freshly
    /// rotated keys are picked up without waiting out the cache window.
    pub async fn key(&self, kid: &str) -> Result<Option<Jwk>, JwksError> {
        let jwks = self.current().await?;
        if let Some(key) = find_key(&jwks, kid) {
            return Ok(Some(key));
        }
        let started = Instant::now();
        let jwks = self
            .refresh_unless(|cached| cached.fetched_at >= started)
            .await?;
        Ok(find_key(&jwks, kid))
    }

    /// The cached document, refreshed when the TTL has elapsed.
    async fn current(&self) -> Result<Jwks, JwksError> {
        {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < CACHE_TTL || self.http.is_none() {
                    return Ok(cached.jwks.clone());
                }
            }
        }
        self.refresh_unless(|cached| cached.fetched_at.elapsed() < CACHE_TTL)
            .await
    }

    /// Fetch a fresh document under the write lock, unless the double-check
    /// finds another task already refreshed (refreshes coalesce). On fetch
    /// failure the previous document, if any, is served unchanged.
    async fn refresh_unless(
        &self,
        still_valid: impl Fn(&CachedJwks) -> bool,
    ) -> Result<Jwks, JwksError> {
        let mut guard = self.cache.write().await;
        if let Some(cached) = guard.as_ref() {
            if still_valid(cached) {
                return Ok(cached.jwks.clone());
            }
        }
        let Some(http) = &self.http else {
            return match guard.as_ref() {
                Some(cached) => Ok(cached.jwks.clone()),
                None => Err(JwksError::Empty),
            };
        };
        match fetch(http, &self.url).await {
            Ok(jwks) => {
                *guard = Some(CachedJwks {
                    jwks: jwks.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(jwks)
            }
            Err(err) => match guard.as_ref() {
                Some(cached) => {
                    warn!(error = %err, "jwks refresh failed, serving cached document");
                    Ok(cached.jwks.clone())
                }
                None => Err(err),
            },
        }
    }
}

fn find_key(jwks: &Jwks, kid: &str) -> Option<Jwk> {
    jwks.keys.iter().find(|k| k.kid == kid).cloned()
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<Jwks, JwksError> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(JwksError::Status(response.status().as_u16()));
    }
    Ok(response.json::<Jwks>().await?)
}
