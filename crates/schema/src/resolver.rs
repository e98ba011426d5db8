//! Schema version resolution against the published spec index.
//!
//! The index document (`SPEC_INDEX.json`) maps schema namespaces to their
//! published versions and lifecycle status. It is cached in memory for five
//! minutes and mirrored to disk for twenty-four hours so the service can
//! start and keep resolving through network outages; when the remote fetch
//! fails and a stale in-memory copy exists, the stale copy is served.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Version used when resolution is unavailable.
pub const DEFAULT_VERSION: &str = "1.0.0";

const MEMORY_TTL: Duration = Duration::from_secs(5 * 60);
const DISK_TTL_HOURS: i64 = 24;
const INDEX_FILE: &str = "SPEC_INDEX.json";

/// The spec index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaIndex {
    #[serde(default)]
    pub schemas: Vec<SchemaInfo>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub latest_stable: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub deprecates: Option<String>,
    #[serde(default)]
    pub replaced_by: Option<String>,
}

/// A resolved schema version, tagged when the schema is deprecated or being
/// replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub deprecated: bool,
}

impl ResolvedVersion {
    pub fn fallback() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            deprecated: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("invalid collection nsid: {0}")]
    InvalidNsid(String),
    #[error("schema not found for namespace {0}")]
    UnknownNamespace(String),
    #[error("no versions published for namespace {0}")]
    NoVersions(String),
    #[error("index fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("index fetch returned status {0}")]
    Status(u16),
    #[error("index parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no index available")]
    Unavailable,
}

struct CachedIndex {
    index: SchemaIndex,
    fetched_at: Instant,
}

pub struct VersionResolver {
    specs_url: String,
    cache_dir: PathBuf,
    http: reqwest::Client,
    cache: RwLock<Option<CachedIndex>>,
}

impl VersionResolver {
    pub fn new(specs_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            specs_url: specs_url.into(),
            cache_dir: cache_dir.into(),
            http,
            cache: RwLock::new(None),
        }
    }

    /// Resolve a collection NSID to its current version.
    pub async fn resolve(&self, collection: &str) -> Result<ResolvedVersion, ResolverError> {
        let namespace = index_namespace(collection)?;
        let index = self.index().await?;
        let info = index
            .schemas
            .iter()
            .find(|s| s.namespace == namespace)
            .ok_or_else(|| ResolverError::UnknownNamespace(namespace.clone()))?;

        if info.status == "stable" && info.replaced_by.is_none() {
            return Ok(ResolvedVersion {
                version: info.latest_stable.clone(),
                deprecated: false,
            });
        }
        if !info.latest_stable.is_empty() {
            return Ok(ResolvedVersion {
                version: info.latest_stable.clone(),
                deprecated: true,
            });
        }
        let version = info
            .versions
            .last()
            .cloned()
            .ok_or_else(|| ResolverError::NoVersions(namespace.clone()))?;
        Ok(ResolvedVersion {
            version,
            deprecated: info.replaced_by.is_some() || info.status == "deprecated",
        })
    }

    /// The index, from memory, disk or the remote, in that order.
    async fn index(&self) -> Result<SchemaIndex, ResolverError> {
        {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < MEMORY_TTL {
                    return Ok(cached.index.clone());
                }
            }
        }

        let mut guard = self.cache.write().await;
        if let Some(cached) = guard.as_ref() {
            if cached.fetched_at.elapsed() < MEMORY_TTL {
                return Ok(cached.index.clone());
            }
        }

        if guard.is_none() {
            if let Some(index) = self.load_from_disk() {
                if Utc::now() - index.generated_at < chrono::Duration::hours(DISK_TTL_HOURS) {
                    debug!("schema index loaded from disk cache");
                    let out = index.clone();
                    *guard = Some(CachedIndex {
                        index,
                        fetched_at: Instant::now(),
                    });
                    return Ok(out);
                }
            }
        }

        match self.fetch_remote().await {
            Ok(index) => {
                self.save_to_disk(&index);
                let out = index.clone();
                *guard = Some(CachedIndex {
                    index,
                    fetched_at: Instant::now(),
                });
                Ok(out)
            }
            Err(err) => match guard.as_ref() {
                Some(stale) => {
                    warn!(error = %err, "schema index fetch failed, serving stale index");
                    Ok(stale.index.clone())
                }
                None => Err(err),
            },
        }
    }

    async fn fetch_remote(&self) -> Result<SchemaIndex, ResolverError> {
        let url = format!("{}/{INDEX_FILE}", self.specs_url.trim_end_matches('/'));
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolverError::Status(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn load_from_disk(&self) -> Option<SchemaIndex> {
        let path = self.cache_dir.join(INDEX_FILE);
        let data = std::fs::read(path).ok()?;
        serde_json::from_slice(&data).ok()
    }

    /// Disk cache failures are not worth failing a write path over.
    fn save_to_disk(&self, index: &SchemaIndex) {
        if std::fs::create_dir_all(&self.cache_dir).is_err() {
            return;
        }
        let Ok(data) = serde_json::to_vec_pretty(index) else {
            return;
        };
        let _ = std::fs::write(self.cache_dir.join(INDEX_FILE), data);
    }
}

/// Map a collection NSID to the namespace used by the spec index.
fn index_namespace(collection: &str) -> Result<String, ResolverError> {
    let parts: Vec<&str> = collection.split('.').collect();
    if parts.len() < 3 {
        return Err(ResolverError::InvalidNsid(collection.to_string()));
    }
    if collection.starts_with("com.registryaccord.feed.")
        || collection.starts_with("com.registryaccord.graph.")
    {
        return match parts.get(3) {
            Some(name) => Ok(format!("ra.social.{name}")),
            None => Err(ResolverError::InvalidNsid(collection.to_string())),
        };
    }
    if collection.starts_with("com.registryaccord.profile") {
        return Ok("ra.social.profile".to_string());
    }
    if collection.starts_with("com.registryaccord.media.") {
        return Ok("ra.social.media".to_string());
    }
    if collection.starts_with("com.registryaccord.moderation.") {
        return Ok("ra.social.moderation".to_string());
    }
    Err(ResolverError::InvalidNsid(collection.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdv_core::collections;

    fn sample_index() -> SchemaIndex {
        SchemaIndex {
            generated_at: Utc::now(),
            schemas: vec![
                SchemaInfo {
                    namespace: "ra.social.post".into(),
                    name: "post".into(),
                    versions: vec!["1.0.0".into(), "1.1.0".into()],
                    latest_stable: "1.1.0".into(),
                    status: "stable".into(),
                    deprecates: None,
                    replaced_by: None,
                },
                SchemaInfo {
                    namespace: "ra.social.profile".into(),
                    name: "profile".into(),
                    versions: vec!["1.0.0".into()],
                    latest_stable: "1.0.0".into(),
                    status: "deprecated".into(),
                    deprecates: Some("0.9.0".into()),
                    replaced_by: Some("ra.social.profile2".into()),
                },
            ],
        }
    }

    #[test]
    fn namespace_mapping() {
        assert_eq!(
            index_namespace(collections::FEED_POST).unwrap(),
            "ra.social.post"
        );
        assert_eq!(
            index_namespace(collections::GRAPH_FOLLOW).unwrap(),
            "ra.social.follow"
        );
        assert_eq!(
            index_namespace(collections::PROFILE).unwrap(),
            "ra.social.profile"
        );
        assert_eq!(
            index_namespace(collections::MEDIA_ASSET).unwrap(),
            "ra.social.media"
        );
        assert_eq!(
            index_namespace(collections::MODERATION_FLAG).unwrap(),
            "ra.social.moderation"
        );
        assert!(index_namespace("bogus").is_err());
    }

    #[tokio::test]
    async fn resolves_stable_and_deprecated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = VersionResolver::new("http://127.0.0.1:0", dir.path());
        *resolver.cache.write().await = Some(CachedIndex {
            index: sample_index(),
            fetched_at: Instant::now(),
        });

        let post = resolver.resolve(collections::FEED_POST).await.unwrap();
        assert_eq!(post.version, "1.1.0");
        assert!(!post.deprecated);

        let profile = resolver.resolve(collections::PROFILE).await.unwrap();
        assert_eq!(profile.version, "1.0.0");
        assert!(profile.deprecated);
    }

    #[tokio::test]
    async fn unknown_namespace_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = VersionResolver::new("http://127.0.0.1:0", dir.path());
        *resolver.cache.write().await = Some(CachedIndex {
            index: sample_index(),
            fetched_at: Instant::now(),
        });
        assert!(matches!(
            resolver.resolve(collections::FEED_LIKE).await,
            Err(ResolverError::UnknownNamespace(_))
        ));
    }

    #[tokio::test]
    async fn disk_cache_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = VersionResolver::new("http://127.0.0.1:0", dir.path());
        resolver.save_to_disk(&sample_index());

        let loaded = resolver.load_from_disk().unwrap();
        assert_eq!(loaded.schemas.len(), 2);
        assert_eq!(loaded.schemas[0].namespace, "ra.social.post");
    }
}
