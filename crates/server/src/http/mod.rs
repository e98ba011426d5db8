//! Router assembly and the request envelope.

pub mod handlers;
pub mod middleware;
pub mod respond;

use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::{Router, middleware::from_fn, middleware::from_fn_with_state};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::warn;

use cdv_auth::TokenVerifier;

use crate::vault::Vault;

/// Per-request deadline, matching the upstream write timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    pub verifier: Arc<TokenVerifier>,
}

/// Build the full application router.
///
/// Mutating routes and the media surface sit behind bearer authentication;
/// health, metrics and record listing are public. Every route passes through
/// correlation-id propagation, completion logging, CORS and a request
/// timeout.
pub fn router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let public = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .route("/v1/repo/listRecords", get(handlers::list_records));

    let authenticated = Router::new()
        .route("/v1/repo/record", post(handlers::create_record))
        .route("/v1/media/uploadInit", post(handlers::upload_init))
        .route("/v1/media/finalize", post(handlers::finalize_media))
        .route("/v1/media/{asset_id}/meta", get(handlers::media_meta))
        .route_layer(from_fn_with_state(state.clone(), middleware::authenticate));

    // Completion logging runs inside routing (route_layer) so it sees the
    // matched route template; correlation wraps it so ids are minted first.
    public
        .merge(authenticated)
        .route_layer(from_fn(middleware::log_requests))
        .with_state(state)
        .layer(from_fn(middleware::correlation))
        .layer(cors_layer(cors_allowed_origins))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}

/// Default-deny CORS: an empty origin list rejects every cross-origin
/// request; `*` opens all origins; anything else matches exactly.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::list([])
    } else if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable cors origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(middleware::CORRELATION_HEADER),
        ])
        .max_age(PREFLIGHT_MAX_AGE)
}
