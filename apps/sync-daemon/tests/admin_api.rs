//! Admin API exercised in-process through the router.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

use ironmart_core::{OrderStatus, PaymentMethod, PaymentStatus};
use ironmart_db::{Database, DbConfig, NewOrder, NewOrderItem, NewProduct};
use ironmart_sync::tally::{ClosingBalance, ImportOutcome, OutboundVoucher, TallyGateway, TallyVoucher};
use ironmart_sync::{SyncConfig, SyncError, SyncResult, TallySyncEngine};
use ironmart_sync_daemon::router;

// =============================================================================
// Helpers
// =============================================================================

/// Tally switched off for the whole test.
struct OfflineTally;

#[async_trait]
impl TallyGateway for OfflineTally {
    async fn ping(&self) -> SyncResult<()> {
        Err(SyncError::TallyUnreachable("connection refused".into()))
    }

    async fn import_voucher(&self, _voucher: &OutboundVoucher) -> SyncResult<ImportOutcome> {
        Err(SyncError::TallyUnreachable("connection refused".into()))
    }

    async fn export_vouchers_since(&self, _alter_id: i64) -> SyncResult<Vec<TallyVoucher>> {
        Err(SyncError::TallyUnreachable("connection refused".into()))
    }

    async fn export_closing_balances(&self) -> SyncResult<Vec<ClosingBalance>> {
        Err(SyncError::TallyUnreachable("connection refused".into()))
    }
}

async fn engine() -> (Arc<Database>, Arc<TallySyncEngine>) {
    let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
    let engine =
        TallySyncEngine::new(SyncConfig::default(), Arc::clone(&db), Arc::new(OfflineTally)).unwrap();
    (db, Arc::new(engine))
}

async fn seed_order(db: &Database) -> String {
    let product = db
        .products()
        .insert_product(&NewProduct {
            name: "Hex Bolt M8".into(),
            sku: Some("HB-M8".into()),
            tally_item_name: None,
            stock: 100,
        })
        .await
        .unwrap();
    db.orders()
        .insert(&NewOrder {
            order_number: "ORD-1001".into(),
            customer_name: "Ravi Hardware".into(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Cod,
            created_at: chrono::Utc::now(),
            items: vec![NewOrderItem {
                product_id: product,
                variation_id: None,
                name: "Hex Bolt M8".into(),
                quantity: 2,
                unit_price_paise: 2_500,
            }],
        })
        .await
        .unwrap()
}

async fn call(engine: &Arc<TallySyncEngine>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router(Arc::clone(engine)).oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_health_is_ok() {
    let (_, engine) = engine().await;
    let resp = router(engine).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_manual_sync_while_offline_is_accepted_not_an_error() {
    let (db, engine) = engine().await;
    let order = seed_order(&db).await;

    let (status, body) = call(&engine, post(&format!("/api/tally/sync/order/{}", order))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "queued");

    let (status, tasks) = call(&engine, get("/api/tally/tasks?status=pending")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["entityId"], order.as_str());

    let (_, status_body) = call(&engine, get("/api/tally/status")).await;
    assert_eq!(status_body["enabled"], true);
    assert_eq!(status_body["queue"]["pending"], 1);
}

#[tokio::test]
async fn test_bad_input_maps_to_error_codes() {
    let (_, engine) = engine().await;

    let (status, body) = call(&engine, post("/api/tally/sync/invoice/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = call(&engine, post("/api/tally/jobs/nightly_backup/run")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = call(&engine, get("/api/tally/logs?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = call(&engine, get("/api/tally/tasks?status=lost")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settings_toggle_gates_tally_jobs() {
    let (_, engine) = engine().await;

    let req = Request::builder()
        .method("PUT")
        .uri("/api/tally/settings")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "tallySyncEnabled": false }).to_string()))
        .unwrap();
    let (status, body) = call(&engine, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tallySyncEnabled"], false);

    let (status, body) = call(&engine, post("/api/tally/jobs/health_check/run")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "disabled");

    let (_, body) = call(&engine, post("/api/tally/jobs/abandoned_order_cleanup/run")).await;
    assert_eq!(body["outcome"], "completed");
    assert_eq!(body["output"]["job"], "cleanup");
}

#[tokio::test]
async fn test_health_check_job_logs_offline_snapshot() {
    let (_, engine) = engine().await;

    let (_, body) = call(&engine, post("/api/tally/jobs/health_check/run")).await;
    assert_eq!(body["outcome"], "completed");

    let (status, logs) = call(&engine, get("/api/tally/logs?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs.as_array().unwrap().len(), 1);
    assert_eq!(logs[0]["online"], false);
}
