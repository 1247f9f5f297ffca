use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::Router;
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use tower::ServiceExt;

use sentrix::api::{self, AppState};
use sentrix::chain::MockChain;
use sentrix::content::MemoryContentStore;
use sentrix::nonce::MemoryNonceStore;
use sentrix::store::Store;
use sentrix::wallet::{address_of, personal_message_hash};

const BOUNDARY: &str = "sentrix-test-boundary";
const SECRET: &str = "integration-test-secret-0123456789";

fn app() -> Router {
    let state = AppState::new(
        Store::in_memory(),
        Arc::new(MemoryNonceStore::new()),
        Arc::new(MemoryContentStore::new()),
        Arc::new(MockChain::new()),
        SECRET,
        Duration::from_secs(3600),
        Duration::from_secs(300),
    )
    .unwrap();

    api::router(
        state,
        HeaderValue::from_static("http://localhost:5173"),
        10 * 1024 * 1024,
    )
}

struct Wallet {
    key: SigningKey,
}

impl Wallet {
    fn new(seed: u8) -> Self {
        Self {
            key: SigningKey::from_slice(&[seed; 32]).unwrap(),
        }
    }

    fn address(&self) -> String {
        address_of(self.key.verifying_key())
    }

    fn sign(&self, message: &str) -> String {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&personal_message_hash(message))
            .unwrap();
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart_request(
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: Option<&[u8]>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(bytes) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"work.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .unwrap()
}

async fn sign_in(app: &Router, wallet: &Wallet) -> String {
    let (status, nonce) = send(app, get(&format!("/auth/nonce?wallet={}", wallet.address()))).await;
    assert_eq!(status, StatusCode::OK);
    let message = nonce["message"].as_str().unwrap();

    let (status, session) = send(
        app,
        json_request(
            "POST",
            "/auth/verify",
            None,
            json!({ "wallet": wallet.address(), "signature": wallet.sign(message) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    session["token"].as_str().unwrap().to_string()
}

async fn register(app: &Router, token: &str, title: &str, content: &[u8]) -> String {
    let (status, asset) = send(
        app,
        multipart_request(
            "/ip/register",
            token,
            &[
                ("title", title),
                ("category", "Music"),
                ("tags", r#"["song","demo"]"#),
                ("content_type", "audio"),
            ],
            Some(content),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{asset}");
    assert_eq!(
        asset["gateway_url"],
        format!("memory://{}", asset["content_fingerprint"].as_str().unwrap())
    );
    asset["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "sentrix");
}

#[tokio::test]
async fn nonce_rejects_malformed_wallet() {
    let (status, body) = send(&app(), get("/auth/nonce?wallet=invalid-address")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = app();
    let (status, _) = send(
        &app,
        json_request("POST", "/license/purchase", None, json!({ "license_id": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        json_request("POST", "/license/purchase", Some("garbage"), json!({ "license_id": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_rejects_a_signature_from_another_wallet() {
    let app = app();
    let owner = Wallet::new(11);
    let intruder = Wallet::new(12);

    let (_, nonce) = send(&app, get(&format!("/auth/nonce?wallet={}", owner.address()))).await;
    let message = nonce["message"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/verify",
            None,
            json!({ "wallet": owner.address(), "signature": intruder.sign(message) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_license_and_report_end_to_end() {
    let app = app();
    let creator = Wallet::new(1);
    let buyer = Wallet::new(2);
    let reporter = Wallet::new(3);

    let creator_token = sign_in(&app, &creator).await;
    let buyer_token = sign_in(&app, &buyer).await;
    let reporter_token = sign_in(&app, &reporter).await;

    let ip_id = register(&app, &creator_token, "Summer Vibes", b"summer vibes master").await;

    // Report an exact copy before any license is sold.
    let (status, report) = send(
        &app,
        multipart_request(
            "/report/submit",
            &reporter_token,
            &[("ip_id", ip_id.as_str()), ("url", "https://example.com/copy")],
            Some(b"summer vibes master"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{report}");
    assert_eq!(report["confidence_score"], 95);
    assert_eq!(report["verdict"]["hash_match"], true);
    assert_eq!(report["verdict"]["analysis_summary"]["hash_comparison"], "exact_match");
    assert_eq!(report["verdict"]["analysis_summary"]["license_status"], "unlicensed");
    let report_id = report["id"].as_str().unwrap().to_string();

    // Offer and sell a license.
    let (status, license) = send(
        &app,
        json_request(
            "POST",
            "/license/create",
            Some(&creator_token),
            json!({
                "ip_id": ip_id,
                "terms": {
                    "commercial_rights": true,
                    "distribution_rights": false,
                    "exclusivity": false,
                    "duration_days": 30,
                    "price": "1000000000000000000"
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{license}");
    assert_eq!(license["status"], "pending");
    let license_id = license["id"].as_str().unwrap().to_string();

    let (status, purchase) = send(
        &app,
        json_request(
            "POST",
            "/license/purchase",
            Some(&buyer_token),
            json!({ "license_id": license_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{purchase}");
    assert_eq!(purchase["license"]["status"], "active");
    assert_eq!(purchase["certificate"]["ip_title"], "Summer Vibes");

    let (_, detail) = send(&app, get(&format!("/ip/{ip_id}"))).await;
    assert_eq!(detail["title"], "Summer Vibes");
    assert!(detail["gateway_url"].as_str().unwrap().starts_with("memory://"));
    assert_eq!(detail["active_licenses"].as_array().unwrap().len(), 1);

    // A rescan sees the sale; the original verdict stays as recorded.
    let (status, rescan) = send(
        &app,
        json_request(
            "POST",
            &format!("/report/{report_id}/rescan"),
            Some(&reporter_token),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{rescan}");
    assert_eq!(rescan["verdict"]["analysis_summary"]["license_status"], "licensed");

    let (_, original) = send(&app, get(&format!("/report/{report_id}"))).await;
    assert_eq!(original["verdict"]["has_active_license"], false);

    let (_, listed) = send(&app, get(&format!("/report/ip/{ip_id}"))).await;
    assert_eq!(listed["reports"].as_array().unwrap().len(), 2);

    // Only the creator may triage.
    let status_uri = format!("/report/{report_id}/status");
    let (status, _) = send(
        &app,
        json_request("PATCH", &status_uri, Some(&reporter_token), json!({ "status": "verified" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, triaged) = send(
        &app,
        json_request("PATCH", &status_uri, Some(&creator_token), json!({ "status": "verified" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(triaged["status"], "verified");

    let (_, revenue) = send(&app, get("/analytics/revenue?days=30")).await;
    assert_eq!(revenue["total_revenue"], "1.0000");
    assert_eq!(revenue["active_licenses"], 1);

    let (_, created) = send(&app, get("/analytics/ip/created")).await;
    assert_eq!(created["total"], 1);

    let (status, metrics) = {
        let response = app.clone().oneshot(get("/metrics")).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    };
    assert_eq!(status, StatusCode::OK);
    assert!(metrics.contains("sentrix_report_hash_matches_total 2"));
}

#[tokio::test]
async fn metadata_report_is_capped_below_a_hash_match() {
    let app = app();
    let creator = Wallet::new(21);
    let reporter = Wallet::new(22);
    let creator_token = sign_in(&app, &creator).await;
    let reporter_token = sign_in(&app, &reporter).await;

    let ip_id = register(&app, &creator_token, "Summer Vibes", b"original").await;

    let (status, report) = send(
        &app,
        multipart_request(
            "/report/submit",
            &reporter_token,
            &[
                ("ip_id", ip_id.as_str()),
                ("declared_title", "summer vibes"),
                ("declared_category", "Music"),
                ("declared_tags", "song, demo"),
            ],
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{report}");
    assert_eq!(report["verdict"]["metadata_similarity"], 1.0);
    assert_eq!(report["confidence_score"], 85);
}

#[tokio::test]
async fn report_against_unknown_asset_is_not_found() {
    let app = app();
    let reporter = Wallet::new(31);
    let token = sign_in(&app, &reporter).await;

    let (status, _) = send(
        &app,
        multipart_request("/report/submit", &token, &[("ip_id", "missing")], None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn asset_listing_paginates() {
    let app = app();
    let creator = Wallet::new(41);
    let token = sign_in(&app, &creator).await;
    for i in 0..3 {
        register(&app, &token, &format!("Work {i}"), format!("work {i}").as_bytes()).await;
    }

    let (status, page) = send(&app, get("/ip?page=1&limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["assets"].as_array().unwrap().len(), 2);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);

    let (_, mine) = send(&app, get(&format!("/ip/user/{}", creator.address()))).await;
    assert_eq!(mine.as_array().unwrap().len(), 3);

    let (status, _) = send(&app, get("/ip?limit=500")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
