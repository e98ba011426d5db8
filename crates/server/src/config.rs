//! Environment-driven configuration.
//!
//! All environment access happens here, once, at startup. Handlers and
//! coordinators receive explicit collaborators built from this struct.

use anyhow::{Result, bail};
use cdv_media::S3Settings;

pub const DEFAULT_SPECS_URL: &str =
    "https://raw.githubusercontent.com/RegistryAccord/registryaccord-specs/main/schemas";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_MEDIA_SIZE: i64 = 10 * 1024 * 1024;
const DEFAULT_MIME_TYPES: &str = "image/jpeg,image/png,image/gif,video/mp4";

#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub port: u16,
    pub db_dsn: Option<String>,
    pub nats_url: Option<String>,
    pub s3: Option<S3Settings>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub identity_url: Option<String>,
    pub specs_url: String,
    pub max_media_size: i64,
    pub allowed_mime_types: Vec<String>,
    pub reject_deprecated_schemas: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// `JWT_ISSUER` and `JWT_AUDIENCE` are mandatory; everything else has a
    /// default or marks an optional collaborator as absent.
    pub fn from_env() -> Result<Self> {
        let Some(jwt_issuer) = var("JWT_ISSUER") else {
            bail!("JWT_ISSUER is required");
        };
        let Some(jwt_audience) = var("JWT_AUDIENCE") else {
            bail!("JWT_AUDIENCE is required");
        };

        let s3 = match (var("S3_ENDPOINT"), var("S3_BUCKET")) {
            (Some(endpoint), Some(bucket)) => Some(S3Settings {
                endpoint,
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                bucket,
                access_key: var("S3_ACCESS_KEY").unwrap_or_default(),
                secret_key: var("S3_SECRET_KEY").unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Self {
            env: var("ENV").unwrap_or_else(|| "dev".to_string()),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            db_dsn: var("DB_DSN"),
            nats_url: var("NATS_URL"),
            s3,
            jwt_issuer,
            jwt_audience,
            identity_url: var("IDENTITY_URL"),
            specs_url: var("SPECS_URL").unwrap_or_else(|| DEFAULT_SPECS_URL.to_string()),
            max_media_size: var("MAX_MEDIA_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_MEDIA_SIZE),
            allowed_mime_types: csv(
                &var("ALLOWED_MIME_TYPES").unwrap_or_else(|| DEFAULT_MIME_TYPES.to_string()),
            ),
            reject_deprecated_schemas: var("REJECT_DEPRECATED_SCHEMAS")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .map(|v| csv(&v))
                .unwrap_or_default(),
        })
    }

    /// The bucket media URIs are composed against, empty when S3 is not
    /// configured (devstack stub mode).
    pub fn media_bucket(&self) -> String {
        self.s3
            .as_ref()
            .map(|s| s.bucket.clone())
            .unwrap_or_default()
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_trims_and_drops_empty_segments() {
        assert_eq!(
            csv(" image/png , image/gif ,,video/mp4"),
            vec!["image/png", "image/gif", "video/mp4"]
        );
        assert!(csv("").is_empty());
    }
}
