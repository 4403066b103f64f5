use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tamperseal_collector::config::CollectorConfig;
use tamperseal_collector::ledger::{MemoryLedger, SharedLedger};
use tamperseal_collector::persistence::StorePersister;
use tamperseal_collector::scheduler::{AnchorScheduler, SchedulerConfig};
use tamperseal_collector::server::{build_router, AppState};
use tamperseal_collector::store::CollectorStore;
use tamperseal_kernel::ChainBuilder;
use tempfile::tempdir;
use tower::ServiceExt; // for oneshot

const FP_A: &str = "1111111111111111111111111111111111111111111111111111111111111111";
const FP_B: &str = "2222222222222222222222222222222222222222222222222222222222222222";
const TOKEN: &str = "test-admin-token";

struct TestApp {
    app: Router,
    store: Arc<CollectorStore>,
    ledger: Arc<MemoryLedger>,
}

fn test_app(admin_token: Option<&str>, persister: Option<Arc<StorePersister>>) -> TestApp {
    let mut config = CollectorConfig::default();
    config.admin_token = admin_token.map(String::from);

    let store = Arc::new(CollectorStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let shared: SharedLedger = ledger.clone();
    let scheduler = Arc::new(AnchorScheduler::new(
        store.clone(),
        shared.clone(),
        SchedulerConfig::from(&config),
        persister,
    ));

    let app = build_router(AppState {
        store: store.clone(),
        ledger: shared,
        scheduler,
        config: Arc::new(config),
    });

    TestApp { app, store, ledger }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let t = test_app(None, None);
    let (status, body) = send(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ledger"], "memory");
}

#[tokio::test]
async fn test_legacy_report_accepted() {
    let t = test_app(None, None);
    let (status, body) = send(
        &t.app,
        "POST",
        "/v1/report",
        Some(json!({ "device_id": "edge-01", "fingerprint": FP_A, "name": "Lobby" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "received");
    assert_eq!(body["next_commit_in"], 0);
    assert!(body.get("breach_detected").is_none());
    assert_eq!(t.store.devices.len(), 1);
}

#[tokio::test]
async fn test_old_firmware_field_names() {
    let t = test_app(None, None);
    let (status, _) = send(
        &t.app,
        "POST",
        "/anchor",
        Some(json!({ "router_id": "aa:bb:cc:dd:ee:ff", "hash": FP_A, "router_name": "Kiosk" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let device = t.store.devices.snapshot_of("aa:bb:cc:dd:ee:ff").await.unwrap();
    assert_eq!(device.metadata.name.as_deref(), Some("Kiosk"));
}

#[tokio::test]
async fn test_invalid_report_rejected_without_side_effects() {
    let t = test_app(None, None);
    let (status, body) = send(
        &t.app,
        "POST",
        "/v1/report",
        Some(json!({ "device_id": "edge-01", "fingerprint": "not-hex" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fingerprint"));
    assert!(t.store.devices.is_empty());
}

#[tokio::test]
async fn test_slot_report_verdict_shape() {
    let t = test_app(None, None);
    let (status, body) = send(
        &t.app,
        "POST",
        "/v1/report",
        Some(json!({
            "device_id": "edge-02",
            "slots": [
                { "slot_id": 1, "date": "2025-04-01", "slot_hash": FP_A, "finalized": true },
                { "slot_id": 2, "date": "2025-04-01", "slot_hash": FP_B, "finalized": false }
            ]
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["breach_detected"], false);
    assert_eq!(body["compromised_slots"].as_array().unwrap().len(), 0);
    assert_eq!(body["pending_slots"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_security_status_lifecycle() {
    let t = test_app(Some(TOKEN), None);

    let (status, _) = send(&t.app, "GET", "/v1/devices/edge-01/security", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&t.app, "POST", "/v1/report", Some(json!({ "device_id": "edge-01", "fingerprint": FP_A })), None).await;
    let (_, body) = send(&t.app, "GET", "/v1/devices/edge-01/security", None, None).await;
    assert_eq!(body["status"], "pending");

    let (status, cycle) = send(&t.app, "POST", "/v1/admin/anchor-cycle", None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycle["legacy_committed"], 1);

    let (_, body) = send(&t.app, "GET", "/v1/devices/edge-01/security", None, None).await;
    assert_eq!(body["status"], "secure");
    assert_eq!(body["match"], true);
    assert_eq!(body["blockchain_hash"], FP_A);
    assert!(body["ledger_txid"].is_string());

    // The chain moves on between commits; the verdict holds against the commit-time copy.
    send(&t.app, "POST", "/v1/report", Some(json!({ "device_id": "edge-01", "fingerprint": FP_B })), None).await;
    let (_, body) = send(&t.app, "GET", "/v1/devices/edge-01/security", None, None).await;
    assert_eq!(body["status"], "secure");
    assert_eq!(body["match"], true);
    assert_eq!(body["local_hash"], FP_B);
    assert_eq!(body["blockchain_hash"], FP_A);

    let (_, list) = send(&t.app, "GET", "/v1/devices", None, None).await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["devices"][0]["security"], "secure");
    assert_eq!(list["devices"][0]["connection"], "online");
}

#[tokio::test]
async fn test_anchor_listing_and_ledger_verification() {
    let t = test_app(Some(TOKEN), None);
    send(&t.app, "POST", "/v1/report", Some(json!({ "device_id": "edge-01", "fingerprint": FP_A })), None).await;
    send(&t.app, "POST", "/v1/admin/anchor-cycle", None, Some(TOKEN)).await;

    let (status, body) = send(&t.app, "GET", "/v1/anchors?device_id=edge-01&limit=5", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let txid = body["anchors"][0]["ledger_txid"].as_str().unwrap().to_string();

    let (status, body) = send(&t.app, "GET", &format!("/v1/anchors/{}/verify", txid), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["ledger_fingerprint"], FP_A);

    let (status, _) = send(&t.app, "GET", "/v1/anchors/unknown/verify", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(t.ledger.submissions(), 1);
}

#[tokio::test]
async fn test_forensic_submission_and_lookup() {
    let t = test_app(None, None);

    let mut chain = ChainBuilder::new();
    for i in 0..12u64 {
        chain.append_logs(format!("log batch {}", i).as_bytes(), 1_700_000_000 + i * 60);
    }
    let mut blocks = chain.into_blocks();
    blocks[7].prev_hash = Some(FP_B.to_string());
    let body = json!({ "blocks": blocks, "context": 2 });

    let (status, _) = send(&t.app, "POST", "/v1/devices/edge-09/forensic", Some(body.clone()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&t.app, "POST", "/v1/report", Some(json!({ "device_id": "edge-09", "fingerprint": FP_A })), None).await;
    let (status, report) = send(&t.app, "POST", "/v1/devices/edge-09/forensic", Some(body), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["report"]["first_break_index"], 7);
    assert_eq!(report["report"]["affected_block_count"], 5);
    assert_eq!(report["breach"]["router_hash"], FP_A);
    assert!(report["breach"]["bsv_hash"].is_null());

    let window = report["report"]["display_window"].as_array().unwrap();
    assert_eq!(window.first().unwrap()["index"], 5);
    assert_eq!(window.len(), 7);
    assert_eq!(window[2]["block"]["is_broken"], true);

    let report_id = report["report_id"].as_str().unwrap();
    assert!(report_id.starts_with("FR-"));

    let (status, again) = send(&t.app, "GET", &format!("/v1/reports/{}?context=0", report_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["report_id"], report_id);
    assert_eq!(again["report"]["display_window"][0]["index"], 7);

    let (_, listing) = send(&t.app, "GET", "/v1/devices/edge-09/reports", None, None).await;
    assert_eq!(listing[0]["report_id"], report_id);

    let (status, _) = send(&t.app, "GET", "/v1/reports/FR-0000000000000000", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_disabled_without_token() {
    let t = test_app(None, None);
    let (status, _) = send(&t.app, "POST", "/v1/admin/reset", None, Some("anything")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reset_requires_matching_token() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("collector.snap");
    let persister = Arc::new(StorePersister::new(&path));
    let t = test_app(Some(TOKEN), Some(persister.clone()));

    send(&t.app, "POST", "/v1/report", Some(json!({ "device_id": "edge-01", "fingerprint": FP_A })), None).await;
    persister.persist(&t.store, 1).await.unwrap();

    let (status, _) = send(&t.app, "POST", "/v1/admin/reset", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&t.app, "POST", "/v1/admin/reset", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(t.store.devices.len(), 1);

    let (status, body) = send(&t.app, "POST", "/v1/admin/reset", None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared_devices"], 1);
    let backup = body["backup"].as_str().unwrap();
    assert!(std::path::Path::new(backup).exists());
    assert!(t.store.devices.is_empty());

    // The on-disk snapshot is now the empty store.
    let restored = CollectorStore::new();
    StorePersister::new(&path).load_into(&restored).await.unwrap();
    assert!(restored.devices.is_empty());
}
