//! End-to-end tests over the in-process HTTP surface.
//!
//! The router runs with the in-memory store, a recording event publisher, an
//! in-memory object store and the insecure-signature verifier (issuer and
//! audience still enforced).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use cdv_auth::{Claims, JwksClient, TokenVerifier, jwks::Jwks, sign_token};
use cdv_core::model::{MediaAsset, Record};
use cdv_core::sha256_hex;
use cdv_events::EventPublisher;
use cdv_media::{ObjectStore, ObjectStoreError, Verification};
use cdv_schema::SchemaRegistry;
use cdv_server::http::{AppState, router};
use cdv_server::vault::{MediaLimits, Vault, VaultSettings};
use cdv_storage::{MemoryStore, Store};

const ISSUER: &str = "test-issuer";
const AUDIENCE: &str = "test-audience";
const ALICE: &str = "did:ra:alice";
const POSTS: &str = "com.registryaccord.feed.post";

#[derive(Default)]
struct RecordingPublisher {
    records: Mutex<Vec<String>>,
    media: Mutex<Vec<String>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_record_created(&self, _correlation_id: &str, record: &Record) -> Result<()> {
        self.records.lock().unwrap().push(record.uri.clone());
        Ok(())
    }

    async fn publish_media_finalized(
        &self,
        _correlation_id: &str,
        asset: &MediaAsset,
    ) -> Result<()> {
        self.media.lock().unwrap().push(asset.asset_id.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeObjectStore {
    fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn presign_put(&self, key: &str, _ttl: Duration) -> Result<String, ObjectStoreError> {
        Ok(format!("https://objects.test/upload/{key}"))
    }

    async fn verify(
        &self,
        key: &str,
        expected_sha256: &str,
    ) -> Result<Verification, ObjectStoreError> {
        let objects = self.objects.lock().unwrap();
        let bytes = objects.get(key).ok_or(ObjectStoreError::NotFound)?;
        Ok(Verification {
            matches: sha256_hex(bytes) == expected_sha256,
            size: bytes.len() as i64,
        })
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    publisher: Arc<RecordingPublisher>,
    objects: Arc<FakeObjectStore>,
}

fn harness() -> Harness {
    harness_with_origins(&[])
}

fn harness_with_origins(origins: &[&str]) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let objects = Arc::new(FakeObjectStore::default());

    let vault = Arc::new(Vault::new(
        store.clone() as Arc<dyn Store>,
        publisher.clone() as Arc<dyn EventPublisher>,
        SchemaRegistry::new().expect("schemas compile"),
        Some(objects.clone() as Arc<dyn ObjectStore>),
        None,
        MediaLimits {
            max_size: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".into(),
                "image/png".into(),
                "image/gif".into(),
                "video/mp4".into(),
            ],
        },
        VaultSettings {
            env: "test".into(),
            bucket: "test-bucket".into(),
            reject_deprecated_schemas: false,
        },
    ));
    let verifier = Arc::new(TokenVerifier::insecure_for_tests(
        JwksClient::with_static_keys(Jwks::default()),
        ISSUER,
        AUDIENCE,
    ));

    let origins: Vec<String> = origins.iter().map(|o| o.to_string()).collect();
    Harness {
        app: router(AppState { vault, verifier }, &origins),
        store,
        publisher,
        objects,
    }
}

fn token_for(subject: &str) -> String {
    let claims = Claims {
        sub: subject.to_string(),
        iss: ISSUER.to_string(),
        aud: AUDIENCE.to_string(),
        exp: Utc::now().timestamp() as u64 + 3600,
        iat: Utc::now().timestamp() as u64,
    };
    sign_token(&[7u8; 32], "test-key", &claims).expect("token signs")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value, Vec<u8>) {
    let response = app.clone().oneshot(request).await.expect("request runs");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes()
        .to_vec();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, bytes)
}

fn post_json(path: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get_with_token(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request builds")
}

fn post_body(did: &str, text: &str) -> Value {
    json!({
        "collection": POSTS,
        "did": did,
        "record": {
            "text": text,
            "createdAt": "2025-01-01T00:00:00Z",
            "authorDid": did,
        },
    })
}

#[tokio::test]
async fn health_endpoints_respond() {
    let h = harness();

    let (status, _, body) = send(&h.app, get_with_token("/healthz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, _, body) = send(&h.app, get_with_token("/readyz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    let (status, _, _) = send(&h.app, get_with_token("/metrics", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_post_round_trips_through_list() {
    let h = harness();
    let token = token_for(ALICE);

    let (status, body, _) = send(
        &h.app,
        post_json("/v1/repo/record", Some(&token), &post_body(ALICE, "hello")),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    let uri = body["data"]["uri"].as_str().expect("uri");
    let prefix = format!("at://{ALICE}/{POSTS}/");
    assert!(uri.starts_with(&prefix), "unexpected uri {uri}");
    let rkey = &uri[prefix.len()..];
    assert_eq!(rkey.len(), 26, "rkey should be a ulid: {rkey}");
    assert!(!body["data"]["cid"].as_str().expect("cid").is_empty());
    let indexed_at = body["data"]["indexedAt"].as_str().expect("indexedAt");
    assert!(chrono::DateTime::parse_from_rfc3339(indexed_at).is_ok());

    let (status, listed, _) = send(
        &h.app,
        get_with_token(&format!("/v1/repo/listRecords?did={ALICE}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let uris: Vec<&str> = listed["data"]["records"]
        .as_array()
        .expect("records")
        .iter()
        .filter_map(|r| r["uri"].as_str())
        .collect();
    assert!(uris.contains(&uri));
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let h = harness();
    let token = token_for(ALICE);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/repo/record")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("x-correlation-id", "corr-42")
        .body(Body::from(post_body(ALICE, "hi").to_string()))
        .unwrap();

    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok()),
        Some("corr-42")
    );
}

#[tokio::test]
async fn did_mismatch_is_forbidden_with_no_side_effects() {
    let h = harness();
    let token = token_for(ALICE);

    let (status, body, _) = send(
        &h.app,
        post_json(
            "/v1/repo/record",
            Some(&token),
            &post_body("did:ra:bob", "hello"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "CDV_DID_MISMATCH");
    assert!(!body["error"]["correlationId"].as_str().unwrap().is_empty());

    let (_, listed, _) = send(
        &h.app,
        get_with_token("/v1/repo/listRecords?did=did:ra:bob", None),
    )
    .await;
    assert_eq!(listed["data"]["records"].as_array().unwrap().len(), 0);
    assert!(h.publisher.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn schema_violation_is_rejected_with_details() {
    let h = harness();
    let token = token_for(ALICE);

    let body = json!({
        "collection": POSTS,
        "did": ALICE,
        "record": {"createdAt": "2025-01-01T00:00:00Z", "authorDid": ALICE},
    });
    let (status, response, _) = send(&h.app, post_json("/v1/repo/record", Some(&token), &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], "CDV_SCHEMA_REJECT");
    assert!(response["error"]["details"].is_array());
    assert!(h.publisher.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let h = harness();
    let token = token_for(ALICE);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/repo/record")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_VALIDATION");
}

#[tokio::test]
async fn missing_and_malformed_credentials_are_unauthorized() {
    let h = harness();

    let (status, body, _) = send(
        &h.app,
        post_json("/v1/repo/record", None, &post_body(ALICE, "hello")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "CDV_AUTHN");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/repo/record")
        .header(header::AUTHORIZATION, "Basic abc")
        .body(Body::from(post_body(ALICE, "hello").to_string()))
        .unwrap();
    let (status, body, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "CDV_AUTHN");

    // Insecure verifier still rejects a foreign issuer.
    let claims = Claims {
        sub: ALICE.to_string(),
        iss: "evil-issuer".to_string(),
        aud: AUDIENCE.to_string(),
        exp: Utc::now().timestamp() as u64 + 3600,
        iat: 0,
    };
    let bad = sign_token(&[7u8; 32], "test-key", &claims).unwrap();
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/repo/record", Some(&bad), &post_body(ALICE, "hello")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "CDV_JWT_INVALID");
}

#[tokio::test]
async fn idempotent_replay_returns_identical_bytes_and_one_record() {
    let h = harness();
    let token = token_for(ALICE);
    let mut body = post_body(ALICE, "once");
    body["idempotencyKey"] = json!("k1");

    let (status1, _, bytes1) = send(&h.app, post_json("/v1/repo/record", Some(&token), &body)).await;
    let (status2, _, bytes2) = send(&h.app, post_json("/v1/repo/record", Some(&token), &body)).await;
    assert_eq!(status1, StatusCode::OK);
    assert_eq!(status2, StatusCode::OK);
    assert_eq!(bytes1, bytes2, "replay must be byte-identical");

    let (_, listed, _) = send(
        &h.app,
        get_with_token(&format!("/v1/repo/listRecords?did={ALICE}"), None),
    )
    .await;
    assert_eq!(listed["data"]["records"].as_array().unwrap().len(), 1);
    assert_eq!(h.publisher.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn idempotency_key_with_different_payload_conflicts() {
    let h = harness();
    let token = token_for(ALICE);

    let mut first = post_body(ALICE, "payload a");
    first["idempotencyKey"] = json!("k1");
    let mut second = post_body(ALICE, "payload b");
    second["idempotencyKey"] = json!("k1");

    let (status, _, _) = send(&h.app, post_json("/v1/repo/record", Some(&token), &first)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = send(&h.app, post_json("/v1/repo/record", Some(&token), &second)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CDV_CONFLICT");
}

#[tokio::test]
async fn pagination_enumerates_forty_records_in_order() {
    let h = harness();
    h.store.create_account(ALICE).await.unwrap();
    let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    for i in 0..40 {
        h.store
            .create_record(Record {
                id: format!("id-{i}"),
                did: ALICE.into(),
                collection: POSTS.into(),
                rkey: format!("{i:026}"),
                uri: format!("at://{ALICE}/{POSTS}/{i:026}"),
                cid: "cid".into(),
                value: json!({"text": format!("post {i}")}),
                indexed_at: base + chrono::Duration::seconds(i),
                schema_version: "1.0.0".into(),
            })
            .await
            .unwrap();
    }

    let (status, first, _) = send(
        &h.app,
        get_with_token(&format!("/v1/repo/listRecords?did={ALICE}&limit=25"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page1 = first["data"]["records"].as_array().unwrap();
    assert_eq!(page1.len(), 25);
    let cursor = first["data"]["nextCursor"].as_str().expect("next cursor");

    // Newest first.
    let times: Vec<&str> = page1
        .iter()
        .map(|r| r["indexedAt"].as_str().unwrap())
        .collect();
    let mut sorted = times.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(times, sorted);

    let (status, second, _) = send(
        &h.app,
        get_with_token(
            &format!("/v1/repo/listRecords?did={ALICE}&limit=25&cursor={cursor}"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let page2 = second["data"]["records"].as_array().unwrap();
    assert_eq!(page2.len(), 15);
    assert!(second["data"].get("nextCursor").is_none());

    let mut uris: Vec<String> = page1
        .iter()
        .chain(page2.iter())
        .map(|r| r["uri"].as_str().unwrap().to_string())
        .collect();
    uris.sort();
    uris.dedup();
    assert_eq!(uris.len(), 40, "every record exactly once");
}

#[tokio::test]
async fn invalid_cursor_is_rejected() {
    let h = harness();
    let (status, body, _) = send(
        &h.app,
        get_with_token(
            &format!("/v1/repo/listRecords?did={ALICE}&cursor=@@not-a-cursor@@"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_CURSOR_INVALID");
}

#[tokio::test]
async fn list_records_requires_did_and_clamps_limit() {
    let h = harness();

    let (status, body, _) = send(&h.app, get_with_token("/v1/repo/listRecords", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_VALIDATION");

    // limit=1000 clamps rather than erroring; an unparseable limit falls
    // back to the default.
    let (status, _, _) = send(
        &h.app,
        get_with_token(&format!("/v1/repo/listRecords?did={ALICE}&limit=1000"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(
        &h.app,
        get_with_token(&format!("/v1/repo/listRecords?did={ALICE}&limit=abc"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn media_two_phase_commit_happy_path_and_checksum_mismatch() {
    let h = harness();
    let token = token_for(ALICE);

    let init = json!({"did": ALICE, "mimeType": "image/png", "size": 100});
    let (status, body, _) = send(&h.app, post_json("/v1/media/uploadInit", Some(&token), &init)).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let asset_id = body["data"]["assetId"].as_str().expect("assetId").to_string();
    let upload_url = body["data"]["uploadUrl"].as_str().expect("uploadUrl");
    assert!(upload_url.contains(&asset_id));
    assert!(body["data"]["expiresAt"].is_string());

    // The client uploads 100 bytes of known content directly.
    let content = vec![42u8; 100];
    let checksum = sha256_hex(&content);
    h.objects.put(&format!("test/{ALICE}/{asset_id}"), content);

    let finalize = json!({"assetId": asset_id, "sha256": checksum});
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/media/finalize", Some(&token), &finalize),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["data"]["checksum"], json!(checksum));
    assert_eq!(body["data"]["size"], json!(100));
    assert_eq!(h.publisher.media.lock().unwrap().len(), 1);

    // A wrong checksum fails and leaves the stored asset untouched.
    let wrong = json!({"assetId": asset_id, "sha256": sha256_hex(b"other")});
    let (status, body, _) = send(&h.app, post_json("/v1/media/finalize", Some(&token), &wrong)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_MEDIA_CHECKSUM");

    let (status, meta, _) = send(
        &h.app,
        get_with_token(&format!("/v1/media/{asset_id}/meta"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["data"]["checksum"], json!(checksum));
    assert_eq!(meta["data"]["size"], json!(100));
}

#[tokio::test]
async fn upload_init_enforces_limits_and_binding() {
    let h = harness();
    let token = token_for(ALICE);

    let oversized = json!({"did": ALICE, "mimeType": "image/png", "size": 11 * 1024 * 1024});
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/media/uploadInit", Some(&token), &oversized),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_MEDIA_SIZE");

    let bad_type = json!({"did": ALICE, "mimeType": "application/zip", "size": 100});
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/media/uploadInit", Some(&token), &bad_type),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_MEDIA_TYPE");

    let foreign = json!({"did": "did:ra:bob", "mimeType": "image/png", "size": 100});
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/media/uploadInit", Some(&token), &foreign),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "CDV_DID_MISMATCH");

    let incomplete = json!({"did": ALICE, "size": 100});
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/media/uploadInit", Some(&token), &incomplete),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CDV_VALIDATION");
}

#[tokio::test]
async fn finalize_unknown_asset_is_not_found() {
    let h = harness();
    let token = token_for(ALICE);
    let finalize = json!({"assetId": "missing", "sha256": sha256_hex(b"x")});
    let (status, body, _) = send(
        &h.app,
        post_json("/v1/media/finalize", Some(&token), &finalize),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "CDV_NOT_FOUND");
}

#[tokio::test]
async fn media_meta_requires_auth_and_reports_missing_assets() {
    let h = harness();

    let (status, _, _) = send(&h.app, get_with_token("/v1/media/abc/meta", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = token_for(ALICE);
    let (status, body, _) = send(
        &h.app,
        get_with_token("/v1/media/abc/meta", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "CDV_NOT_FOUND");
}

#[tokio::test]
async fn cors_preflight_honours_the_origin_list() {
    let allowed = harness_with_origins(&["https://app.example"]);
    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/v1/repo/record")
        .header(header::ORIGIN, "https://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = allowed.app.clone().oneshot(preflight).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://app.example")
    );

    // Default configuration denies all cross-origin callers.
    let denied = harness();
    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/v1/repo/record")
        .header(header::ORIGIN, "https://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = denied.app.clone().oneshot(preflight).await.unwrap();
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}
