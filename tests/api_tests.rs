mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::Harness;
use wallet_ledger::handlers;

async fn call(h: &Harness, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = handlers::router(h.ctx.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new().await;
    let (status, body) = call(&h, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_open_wallet_and_transfer() {
    let h = Harness::new().await;

    let (status, body) = call(&h, "POST", "/api/v1/wallets", Some(json!({ "pin": "123456" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["balance"], 0);
    assert!(body.get("pin_hash").is_none());
    let bob = body["id"].as_str().unwrap().to_string();

    let alice = h.wallet(10_000).await;
    let (status, body) = call(
        &h,
        "POST",
        "/api/v1/transfers/internal",
        Some(json!({
            "source": alice,
            "destination": bob,
            "amount": 1500,
            "pin": "123456"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["transaction_id"].is_string());

    let (status, body) = call(&h, "GET", &format!("/api/v1/wallets/{bob}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 1500);
}

#[tokio::test]
async fn test_error_body_shape() {
    let h = Harness::new().await;
    let alice = h.wallet(100).await;
    let bob = h.wallet(0).await;

    let (status, body) = call(
        &h,
        "POST",
        "/api/v1/transfers/internal",
        Some(json!({
            "source": alice,
            "destination": bob,
            "amount": 150,
            "pin": "123456"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "insufficient_balance");

    let (status, body) = call(
        &h,
        "GET",
        &format!("/api/v1/transactions/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "transaction_not_found");
}

#[tokio::test]
async fn test_payroll_callback_reports_deferral() {
    let h = Harness::new().await;
    let employee = h.wallet(0).await;
    let account = h.bank_account(employee, common::BCA).await;

    let (status, _) = call(
        &h,
        "POST",
        "/api/v1/payment-plans",
        Some(json!({
            "wallet_id": employee,
            "bank_account_id": account,
            "instalments": [{ "amount": 500000, "due_date": "2026-11-25" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let credit = json!({
        "wallet_id": employee,
        "amount": 5000000,
        "flag": "RECEIVE_PAYROLL",
        "source_account": "014:9988776655",
        "ref_number": "PAYROLL-2026-10"
    });
    let (status, body) = call(&h, "POST", "/api/v1/bank-callbacks/credits", Some(credit.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], json!(["AUTO_DEBIT"]));

    // Replayed callback is acknowledged without a second credit
    let (status, replay) = call(&h, "POST", "/api/v1/bank-callbacks/credits", Some(credit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["transaction_id"], body["transaction_id"]);
    assert_eq!(h.balance(employee).await, 5_000_000);
}

#[tokio::test]
async fn test_history_query_string() {
    let h = Harness::new().await;
    let alice = h.wallet(10_000).await;

    let uri = format!(
        "/api/v1/wallets/{alice}/transactions?from=2026-10-01T00:00:00Z&to=2026-11-01T00:00:00Z&direction=in"
    );
    let (status, body) = call(&h, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["transaction_type"], "TOP_UP");
}
