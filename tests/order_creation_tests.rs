//! Checkout through the HTTP layer
//!
//! Covers authoritative pricing, the honeypot, validation, pricing
//! failures, compensating rollback, throttling and the email handoff.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{Value, json};
use store::prelude::*;
use store::storage::WriteStep;

fn order_id(body: &Value) -> Uuid {
    Uuid::parse_str(body["order_id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_prices_come_from_catalog_not_client() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 2);
    payload["items"][0]["unit_price"] = json!(1);

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 1000.0);
    assert_eq!(body["deposit"], 500.0);

    let id = order_id(&body);
    assert_eq!(body["order_number"], id.simple().to_string()[..8].to_uppercase());

    let order = app.db.get_order(&id).await.unwrap().unwrap();
    assert_eq!(order.subtotal, 1000.0);
    assert_eq!(order.deposit_amount, 500.0);
    assert_eq!(order.total_amount, 1000.0);
    assert_eq!(order.status, "pending_payment_50");
    assert_eq!(order.customer_email, "ana@example.com");

    let items = app.db.items_for_order(&id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, 500.0);
    assert_eq!(items[0].quantity, 2);

    let payments = app.db.payments_for_order(&id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 500.0);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert!(payments[0].is_deposit());
    assert_eq!(payments[0].method, "transfer");
    assert_eq!(body["payment_id"], payments[0].id.to_string());
}

#[tokio::test]
async fn test_subtotal_sums_every_line() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);
    payload["items"].as_array_mut().unwrap().push(json!({
        "product_id": app.catalog.product_id.to_string(),
        "variant_id": app.catalog.player_variant.to_string(),
        "size_id": app.catalog.size_m.to_string(),
        "quantity": "3",
        "personalization_type": "player",
        "player_id": app.catalog.player_id.to_string(),
    }));

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status_ok();
    let body: Value = response.json();

    // 500 * 1 + 1250 * 3
    assert_eq!(body["total"], 4250.0);
    assert_eq!(body["deposit"], 2125.0);
    assert_eq!(app.db.item_count(), 2);
}

#[tokio::test]
async fn test_deposit_follows_configured_percentage() {
    let mut config = test_config();
    config.orders.deposit_percentage = 0.25;
    let app = spawn_app_with(config, RecordingMailer::new());

    let body = app.place_order(app.catalog.player_variant, 2).await;
    assert_eq!(body["total"], 2500.0);
    assert_eq!(body["deposit"], 625.0);
}

#[tokio::test]
async fn test_honeypot_reports_success_and_writes_nothing() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);
    payload["_honey"] = json!("http://spam.example");

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body, json!({ "success": true }));
    assert_eq!(app.db.order_count(), 0);
    assert_eq!(app.db.item_count(), 0);
    assert_eq!(app.db.payment_count(), 0);
}

#[tokio::test]
async fn test_empty_honeypot_is_ignored() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);
    payload["_honey"] = json!("");

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status_ok();
    assert_eq!(app.db.order_count(), 1);
}

#[tokio::test]
async fn test_unknown_variant_writes_nothing() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);
    payload["items"].as_array_mut().unwrap().push(json!({
        "product_id": app.catalog.product_id.to_string(),
        "variant_id": Uuid::new_v4().to_string(),
        "quantity": 1,
    }));

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();

    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNKNOWN_VARIANT");
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert_eq!(app.db.order_count(), 0);
    assert_eq!(app.db.item_count(), 0);
    assert_eq!(app.db.payment_count(), 0);
}

#[tokio::test]
async fn test_variant_of_another_product_is_rejected() {
    let app = spawn_app();
    let other_product = app.db.add_product("Motagua Local 2025", None);
    let payload = order_payload(app.catalog.fan_variant, other_product, 1);

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "VARIANT_PRODUCT_MISMATCH");
    assert_eq!(app.db.order_count(), 0);
}

#[tokio::test]
async fn test_validation_reports_every_field() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);
    payload["customer_email"] = json!("not-an-email");
    payload["payment_method"] = json!("  ");
    payload["items"][0]["variant_id"] = json!("");
    payload["items"][0]["quantity"] = json!(0);

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();

    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["details"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"customer_email"));
    assert!(fields.contains(&"payment_method"));
    assert!(fields.contains(&"items[0].variant_id"));
    assert!(fields.contains(&"items[0].quantity"));
    assert_eq!(app.db.order_count(), 0);
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let app = spawn_app();
    let mut payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);
    payload["items"] = json!([]);

    let response = app.server.post("/api/orders/create").json(&payload).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = spawn_app();
    let response = app
        .server
        .post("/api/orders/create")
        .text("{\"customer_name\": ")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_failed_items_insert_removes_order() {
    let app = spawn_app();
    app.db.inject_failure(WriteStep::Items);

    let response = app
        .server
        .post("/api/orders/create")
        .json(&order_payload(app.catalog.fan_variant, app.catalog.product_id, 1))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(app.db.order_count(), 0);
    assert_eq!(app.db.item_count(), 0);
    assert_eq!(app.db.payment_count(), 0);
}

#[tokio::test]
async fn test_failed_payment_insert_removes_order_and_items() {
    let app = spawn_app();
    app.db.inject_failure(WriteStep::Payment);

    let response = app
        .server
        .post("/api/orders/create")
        .json(&order_payload(app.catalog.fan_variant, app.catalog.product_id, 1))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "STORAGE_ERROR");

    assert_eq!(app.db.order_count(), 0);
    assert_eq!(app.db.item_count(), 0);
    assert_eq!(app.db.payment_count(), 0);
}

#[tokio::test]
async fn test_failed_rollback_is_reported() {
    let app = spawn_app();
    app.db.inject_failure(WriteStep::Payment);
    app.db.inject_failure(WriteStep::DeleteOrder);

    let response = app
        .server
        .post("/api/orders/create")
        .json(&order_payload(app.catalog.fan_variant, app.catalog.product_id, 1))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "STORAGE_ROLLBACK_FAILED");
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let app = spawn_app_with(config, RecordingMailer::new());
    let payload = order_payload(app.catalog.fan_variant, app.catalog.product_id, 1);

    for _ in 0..2 {
        from_ip(app.server.post("/api/orders/create"), "203.0.113.7")
            .json(&payload)
            .await
            .assert_status_ok();
    }

    let limited = from_ip(app.server.post("/api/orders/create"), "203.0.113.7")
        .json(&payload)
        .await;
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited
        .header("retry-after")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);
    let body: Value = limited.json();
    assert_eq!(body["code"], "RATE_LIMITED");

    from_ip(app.server.post("/api/orders/create"), "198.51.100.1")
        .json(&payload)
        .await
        .assert_status_ok();
    assert_eq!(app.db.order_count(), 3);
}

#[tokio::test]
async fn test_confirmation_emails_are_sent() {
    let app = spawn_app();
    let body = app.place_default_order().await;
    let number = body["order_number"].as_str().unwrap().to_string();

    let sent = app.wait_for_emails(2).await;
    assert_eq!(sent.len(), 2);

    let customer = sent
        .iter()
        .find(|m| m.to == vec!["ana@example.com".to_string()])
        .unwrap();
    assert!(customer.subject.contains(&number));
    assert!(customer.text.contains("L 500.00"));

    assert!(
        sent.iter()
            .any(|m| m.to == vec!["ventas@noventaycinco.store".to_string()])
    );
}

#[tokio::test]
async fn test_email_outage_does_not_fail_the_order() {
    let app = spawn_app_with(test_config(), RecordingMailer::failing_first(1_000));

    let body = app.place_default_order().await;
    assert_eq!(body["success"], true);
    assert_eq!(app.db.order_count(), 1);
}
