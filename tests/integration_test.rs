//! Integration tests for health checks and webhook ingestion.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use coria_backend::api::{SIGNATURE_HEADER, create_router};
use coria_backend::domain::{
    CreatePaymentRequest, DatabaseClient, HealthResponse, HealthStatus, PaymentKind,
    PaymentStatus, SolanaPayment,
};
use coria_backend::test_utils::{
    TestContext, sample_wallet, sign_webhook, test_pools, test_pubkey, test_tx_signature,
};

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn webhook(uri: &str, body: String, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed_webhook(uri: &str, payload: &Value) -> Request<Body> {
    let signature = sign_webhook(payload);
    webhook(uri, payload.to_string(), Some(&signature))
}

async fn seed_pending_payment(
    ctx: &TestContext,
    amount: i64,
    tx_signature: Option<String>,
) -> SolanaPayment {
    let user_id = Uuid::new_v4();
    let wallet = ctx
        .db
        .create_wallet(&sample_wallet(user_id, &test_pubkey(7)))
        .await
        .unwrap();
    let mut request =
        CreatePaymentRequest::new(wallet.id, PaymentKind::Donation, amount, "checkout-1");
    request.tx_signature = tx_signature;
    let (payment, created) = ctx
        .state
        .service
        .create_payment(user_id, &request)
        .await
        .unwrap();
    assert!(created);
    payment
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_health_all_services_ok() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let health: HealthResponse = serde_json::from_value(body.clone()).unwrap();
    assert_eq!(health.status, HealthStatus::Ok);
    assert_eq!(health.environment, "development");
    assert_eq!(health.solana_network, "devnet");
    assert_eq!(body["services"]["database"], json!({ "status": "ok" }));
    assert_eq!(body["services"]["redis"], json!({ "status": "ok" }));
    assert_eq!(body["services"]["solana_rpc"], json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_health_degraded_when_redis_down() {
    let ctx = TestContext::new();
    ctx.cache.set_healthy(false);
    let router = create_router(Arc::clone(&ctx.state));

    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["redis"]["status"], "error");
    assert_eq!(body["services"]["redis"]["message"], "Connection refused");
    assert_eq!(body["services"]["database"]["status"], "ok");
}

#[tokio::test]
async fn test_health_reports_rpc_message() {
    let ctx = TestContext::new();
    ctx.blockchain.set_healthy(false);
    let router = create_router(Arc::clone(&ctx.state));

    let (_, body) = send(&router, get("/health")).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["solana_rpc"]["message"], "RPC unhealthy");
}

#[tokio::test]
async fn test_readiness_follows_health() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let (status, _) = send(&router, get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);

    ctx.db.set_healthy(false);
    let (status, _) = send(&router, get("/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&router, get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// WEBHOOK AUTHENTICATION
// ============================================================================

#[tokio::test]
async fn test_webhook_missing_signature() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    for uri in ["/webhooks/solana", "/webhooks/payment"] {
        let (status, body) = send(&router, webhook(uri, "{}".to_string(), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Missing webhook signature");
    }
}

#[tokio::test]
async fn test_webhook_invalid_signature() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let payload = json!({ "event": "ping" });
    let (status, body) = send(
        &router,
        webhook("/webhooks/payment", payload.to_string(), Some(&"ab".repeat(32))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid webhook signature");

    // Non-hex garbage is a mismatch too
    let (status, _) = send(
        &router,
        webhook("/webhooks/payment", payload.to_string(), Some("not-hex")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_body_not_json() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let (status, _) = send(
        &router,
        webhook("/webhooks/solana", "not json".to_string(), Some("abcd")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_valid_signature_acknowledged() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let payload = json!({ "event": "ping", "nested": { "z": 1, "a": [true, null] } });
    let (status, body) = send(&router, signed_webhook("/webhooks/payment", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn test_webhook_signature_ignores_key_order() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let signature = sign_webhook(&json!({ "a": 1, "b": 2 }));
    let (status, _) = send(
        &router,
        webhook(
            "/webhooks/solana",
            r#"{ "b": 2, "a": 1 }"#.to_string(),
            Some(&signature),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// WEBHOOK PROCESSING
// ============================================================================

#[tokio::test]
async fn test_solana_webhook_confirms_matching_payment() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));
    let sig = test_tx_signature(1);
    let payment = seed_pending_payment(&ctx, 50_000_000, Some(sig.clone())).await;
    ctx.blockchain.confirm_transfer(
        &sig,
        &test_pubkey(7),
        &test_pools().donation_pool,
        50_000_000,
    );

    let payload = json!([{ "signature": sig, "transactionError": null }]);
    let (status, _) = send(&router, signed_webhook("/webhooks/solana", &payload)).await;
    assert_eq!(status, StatusCode::OK);

    let stored = ctx.db.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Confirmed);
    assert_eq!(ctx.db.ledger_entries().len(), 1);
}

#[tokio::test]
async fn test_solana_webhook_mixed_batch_processes_valid_events() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));
    let sig = test_tx_signature(5);
    let payment = seed_pending_payment(&ctx, 3_000_000, Some(sig.clone())).await;
    ctx.blockchain.confirm_transfer(
        &sig,
        &test_pubkey(7),
        &test_pools().donation_pool,
        3_000_000,
    );

    let payload = json!([{ "type": "UNKNOWN" }, { "signature": sig }, "noise"]);
    let (status, body) = send(&router, signed_webhook("/webhooks/solana", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    assert_eq!(ctx.blockchain.status_calls(), 1);
    let stored = ctx.db.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Confirmed);
    assert_eq!(ctx.db.ledger_entries().len(), 1);
}

#[tokio::test]
async fn test_solana_webhook_replay_not_processed_twice() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));
    let sig = test_tx_signature(2);
    seed_pending_payment(&ctx, 10_000, Some(sig.clone())).await;

    let payload = json!({ "signature": sig });
    let (first, _) = send(&router, signed_webhook("/webhooks/solana", &payload)).await;
    let (second, body) = send(&router, signed_webhook("/webhooks/solana", &payload)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert_eq!(ctx.blockchain.status_calls(), 1);
}

#[tokio::test]
async fn test_solana_webhook_reported_error_fails_payment() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));
    let sig = test_tx_signature(3);
    let payment = seed_pending_payment(&ctx, 10_000, Some(sig.clone())).await;

    let payload = json!({ "signature": sig, "err": { "InstructionError": [0, "Custom"] } });
    let (status, _) = send(&router, signed_webhook("/webhooks/solana", &payload)).await;
    assert_eq!(status, StatusCode::OK);

    let stored = ctx.db.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert!(
        stored
            .error_message
            .unwrap()
            .starts_with("Transaction failed")
    );
    assert!(ctx.db.ledger_entries().is_empty());
}

#[tokio::test]
async fn test_payment_webhook_failed_status() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));
    let payment = seed_pending_payment(&ctx, 10_000, None).await;

    let payload = json!({ "paymentId": payment.id, "status": "failed", "reason": "Card declined" });
    let (status, _) = send(&router, signed_webhook("/webhooks/payment", &payload)).await;
    assert_eq!(status, StatusCode::OK);

    let stored = ctx.db.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("Card declined"));
}

#[tokio::test]
async fn test_payment_webhook_confirmed_attaches_signature() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));
    let payment = seed_pending_payment(&ctx, 2_000_000, None).await;
    let sig = test_tx_signature(4);
    ctx.blockchain.confirm_transfer(
        &sig,
        &test_pubkey(7),
        &test_pools().donation_pool,
        2_000_000,
    );

    let payload = json!({ "paymentId": payment.id, "status": "confirmed", "txSignature": sig });
    let (status, _) = send(&router, signed_webhook("/webhooks/payment", &payload)).await;
    assert_eq!(status, StatusCode::OK);

    let stored = ctx.db.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.tx_signature.as_deref(), Some(sig.as_str()));
    assert_eq!(stored.status, PaymentStatus::Confirmed);
}

#[tokio::test]
async fn test_payment_webhook_unknown_payment_ignored() {
    let ctx = TestContext::new();
    let router = create_router(Arc::clone(&ctx.state));

    let payload = json!({ "paymentId": Uuid::new_v4(), "status": "confirmed" });
    let (status, body) = send(&router, signed_webhook("/webhooks/payment", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
