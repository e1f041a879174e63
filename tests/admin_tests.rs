//! Back-office endpoints: access control, status workflow, payments,
//! reports and the admin whitelist

mod common;

use axum::http::StatusCode;
use common::*;
use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use store::core::query::OrderFilter;
use store::prelude::*;

async fn set_status(app: &TestApp, order_id: &str, body: Value) -> axum_test::TestResponse {
    bearer(
        app.server
            .patch(&format!("/api/admin/orders/{}/status", order_id)),
        ADMIN_TOKEN,
    )
    .json(&body)
    .await
}

async fn set_payment(app: &TestApp, payment_id: &str, status: &str) -> axum_test::TestResponse {
    bearer(
        app.server
            .patch(&format!("/api/admin/payments/{}/status", payment_id)),
        ADMIN_TOKEN,
    )
    .json(&json!({ "status": status }))
    .await
}

async fn stored_status(app: &TestApp, order_id: &str) -> String {
    let id = Uuid::parse_str(order_id).unwrap();
    app.db.get_order(&id).await.unwrap().unwrap().status
}

// ============================================================================
// Access control
// ============================================================================

#[tokio::test]
async fn test_admin_routes_require_a_session() {
    let app = spawn_app();

    let response = app.server.get("/api/admin/orders").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");

    bearer(app.server.get("/api/admin/orders"), "made-up-token")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_reject_non_admins() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    let response = bearer(app.server.get("/api/admin/orders"), USER_TOKEN).await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "FORBIDDEN");

    bearer(
        app.server
            .patch(&format!("/api/admin/orders/{}/status", order_id)),
        USER_TOKEN,
    )
    .json(&json!({ "status": "processing" }))
    .await
    .assert_status(StatusCode::FORBIDDEN);

    assert_eq!(stored_status(&app, order_id).await, "pending_payment_50");
}

#[tokio::test]
async fn test_public_routes_need_no_session() {
    let app = spawn_app();

    let response = app.server.get("/api/catalog/products").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 1);

    app.server.get("/health").await.assert_status_ok();
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_list_orders_newest_first_with_status_filter() {
    let app = spawn_app();
    let first = app.place_default_order().await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = app.place_default_order().await;
    set_status(
        &app,
        first["order_id"].as_str().unwrap(),
        json!({ "status": "deposit_paid" }),
    )
    .await
    .assert_status_ok();

    let body: Value = bearer(app.server.get("/api/admin/orders"), ADMIN_TOKEN)
        .await
        .json();
    assert_eq!(body["count"], 2);
    assert_eq!(body["orders"][0]["id"], second["order_id"]);
    assert_eq!(body["orders"][0]["order_number"], second["order_number"]);
    assert_eq!(body["orders"][0]["customer_email"], "ana@example.com");

    let body: Value = bearer(app.server.get("/api/admin/orders"), ADMIN_TOKEN)
        .add_query_param("status", "deposit_paid")
        .await
        .json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["orders"][0]["id"], first["order_id"]);
    assert_eq!(body["orders"][0]["status_info"]["label"], "Anticipo recibido");
}

#[tokio::test]
async fn test_order_detail() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    let response = bearer(
        app.server.get(&format!("/api/admin/orders/{}", order_id)),
        ADMIN_TOKEN,
    )
    .await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["order"]["id"], order_id);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["item_labels"][0]["product_name"], "Olimpia Local 2025");
    assert_eq!(body["payments"][0]["id"], placed["payment_id"]);
}

#[tokio::test]
async fn test_order_detail_errors() {
    let app = spawn_app();

    let response = bearer(
        app.server
            .get(&format!("/api/admin/orders/{}", Uuid::new_v4())),
        ADMIN_TOKEN,
    )
    .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = bearer(app.server.get("/api/admin/orders/not-a-uuid"), ADMIN_TOKEN).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));
}

// ============================================================================
// Status workflow
// ============================================================================

#[tokio::test]
async fn test_forward_transition() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    let response = set_status(&app, order_id, json!({ "status": "processing" })).await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["changed"], true);
    assert_eq!(body["order"]["status"], "processing");
    assert!(
        body["revalidate"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == "/admin/orders")
    );
    assert_eq!(stored_status(&app, order_id).await, "processing");
}

#[tokio::test]
async fn test_terminal_state_refuses_backward_move() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    set_status(&app, order_id, json!({ "status": "completed" }))
        .await
        .assert_status_ok();

    let response = set_status(&app, order_id, json!({ "status": "pending_payment_50" })).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_TRANSITION");
    assert_eq!(body["details"]["from"], "completed");
    assert_eq!(body["details"]["to"], "pending_payment_50");
    assert_eq!(stored_status(&app, order_id).await, "completed");

    let response = set_status(
        &app,
        order_id,
        json!({ "status": "pending_payment_50", "force": true }),
    )
    .await;
    response.assert_status_ok();
    assert_eq!(stored_status(&app, order_id).await, "pending_payment_50");
}

#[tokio::test]
async fn test_any_open_order_can_be_cancelled() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    set_status(&app, order_id, json!({ "status": "in_customs" }))
        .await
        .assert_status_ok();
    set_status(&app, order_id, json!({ "status": "cancelled" }))
        .await
        .assert_status_ok();

    set_status(&app, order_id, json!({ "status": "processing" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_status_is_rejected() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    let response = set_status(&app, order_id, json!({ "status": "lost_at_sea" })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNKNOWN_STATUS");
    assert_eq!(stored_status(&app, order_id).await, "pending_payment_50");
}

#[tokio::test]
async fn test_same_status_changes_nothing() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    let response = set_status(&app, order_id, json!({ "status": "pending_payment_50" })).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["changed"], false);
    assert!(body.get("revalidate").is_none());
}

#[tokio::test]
async fn test_status_of_unknown_order_is_not_found() {
    let app = spawn_app();
    set_status(
        &app,
        &Uuid::new_v4().to_string(),
        json!({ "status": "processing" }),
    )
    .await
    .assert_status(StatusCode::NOT_FOUND);
}

/// Order store whose next `get_order` answers with an outdated copy
struct StaleOrders {
    inner: InMemoryStore,
    stale: Mutex<Option<Order>>,
}

#[async_trait]
impl OrderService for StaleOrders {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.inner.insert_order(order).await
    }
    async fn insert_items(&self, items: &[OrderItem]) -> Result<()> {
        self.inner.insert_items(items).await
    }
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.inner.insert_payment(payment).await
    }
    async fn delete_order(&self, order_id: &Uuid) -> Result<()> {
        self.inner.delete_order(order_id).await
    }
    async fn delete_items(&self, order_id: &Uuid) -> Result<()> {
        self.inner.delete_items(order_id).await
    }
    async fn get_order(&self, id: &Uuid) -> Result<Option<Order>> {
        if let Some(order) = self.stale.lock().unwrap().take() {
            return Ok(Some(order));
        }
        self.inner.get_order(id).await
    }
    async fn find_order_in_range(&self, lower: &Uuid, upper: &Uuid) -> Result<Option<Order>> {
        self.inner.find_order_in_range(lower, upper).await
    }
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        self.inner.list_orders(filter).await
    }
    async fn items_for_order(&self, order_id: &Uuid) -> Result<Vec<OrderItem>> {
        self.inner.items_for_order(order_id).await
    }
    async fn items_for_orders(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        self.inner.items_for_orders(order_ids).await
    }
    async fn payments_for_order(&self, order_id: &Uuid) -> Result<Vec<Payment>> {
        self.inner.payments_for_order(order_id).await
    }
    async fn update_order_status(&self, id: &Uuid, status: &str) -> Result<Option<Order>> {
        self.inner.update_order_status(id, status).await
    }
    async fn advance_order_status(&self, id: &Uuid, from: &str, to: &str) -> Result<bool> {
        self.inner.advance_order_status(id, from, to).await
    }
    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>> {
        self.inner.get_payment(id).await
    }
    async fn update_payment_status(
        &self,
        id: &Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>> {
        self.inner.update_payment_status(id, status).await
    }
}

#[tokio::test]
async fn test_status_change_refused_when_order_moved_meanwhile() {
    let db = InMemoryStore::new();
    db.add_admin(ADMIN_EMAIL);
    let catalog = seed_catalog(&db);
    let orders = Arc::new(StaleOrders {
        inner: db.clone(),
        stale: Mutex::new(None),
    });

    let router = ServerBuilder::new()
        .with_config(test_config())
        .with_in_memory_store(db.clone())
        .with_order_service(orders.clone())
        .with_mailer(Arc::new(RecordingMailer::new()))
        .build()
        .unwrap();
    let server = TestServer::new(router);

    let placed: Value = server
        .post("/api/orders/create")
        .json(&order_payload(catalog.fan_variant, catalog.product_id, 1))
        .await
        .json();
    let id = Uuid::parse_str(placed["order_id"].as_str().unwrap()).unwrap();

    // Another admin completed the order after this one loaded it as processing
    let mut snapshot = db.get_order(&id).await.unwrap().unwrap();
    snapshot.status = "processing".to_string();
    db.update_order_status(&id, "completed").await.unwrap();
    *orders.stale.lock().unwrap() = Some(snapshot);

    let response = bearer(
        server.patch(&format!("/api/admin/orders/{}/status", id)),
        ADMIN_TOKEN,
    )
    .json(&json!({ "status": "ready_for_delivery" }))
    .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_TRANSITION");
    assert_eq!(body["details"]["from"], "completed");

    let stored = db.get_order(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, "completed");
}

// ============================================================================
// Payments
// ============================================================================

#[tokio::test]
async fn test_completed_deposit_advances_order() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();
    let payment_id = placed["payment_id"].as_str().unwrap();

    let response = set_payment(&app, payment_id, "completed").await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["payment"]["status"], "completed");
    assert_eq!(body["order_advanced"], true);
    assert_eq!(stored_status(&app, order_id).await, "deposit_paid");
}

#[tokio::test]
async fn test_completed_deposit_leaves_later_states_alone() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();
    let payment_id = placed["payment_id"].as_str().unwrap();

    set_status(&app, order_id, json!({ "status": "processing" }))
        .await
        .assert_status_ok();

    let body: Value = set_payment(&app, payment_id, "completed").await.json();
    assert_eq!(body["order_advanced"], false);
    assert_eq!(stored_status(&app, order_id).await, "processing");
}

#[tokio::test]
async fn test_failed_payment_does_not_advance() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let order_id = placed["order_id"].as_str().unwrap();

    let body: Value = set_payment(&app, placed["payment_id"].as_str().unwrap(), "failed")
        .await
        .json();
    assert_eq!(body["payment"]["status"], "failed");
    assert_eq!(body["order_advanced"], false);
    assert_eq!(stored_status(&app, order_id).await, "pending_payment_50");
}

#[tokio::test]
async fn test_invalid_payment_status() {
    let app = spawn_app();
    let placed = app.place_default_order().await;

    let response = set_payment(&app, placed["payment_id"].as_str().unwrap(), "refunded").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"]["fields"][0]["field"], "status");

    set_payment(&app, &Uuid::new_v4().to_string(), "completed")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Reports
// ============================================================================

#[tokio::test]
async fn test_report_includes_items() {
    let app = spawn_app();
    app.place_default_order().await;
    app.place_order(app.catalog.player_variant, 1).await;

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let response = bearer(app.server.get("/api/admin/reports/orders"), ADMIN_TOKEN)
        .add_query_param("startDate", &today)
        .add_query_param("endDate", &today)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    assert_eq!(body["count"], 2);
    for row in body["orders"].as_array().unwrap() {
        assert_eq!(row["items"].as_array().unwrap().len(), 1);
        assert_eq!(row["order_number"].as_str().unwrap().len(), 8);
    }
}

#[tokio::test]
async fn test_report_filters_by_date_and_status() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    app.place_default_order().await;
    set_status(
        &app,
        placed["order_id"].as_str().unwrap(),
        json!({ "status": "cancelled" }),
    )
    .await
    .assert_status_ok();

    let body: Value = bearer(app.server.get("/api/admin/reports/orders"), ADMIN_TOKEN)
        .add_query_param("status", "cancelled")
        .await
        .json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["orders"][0]["id"], placed["order_id"]);

    let body: Value = bearer(app.server.get("/api/admin/reports/orders"), ADMIN_TOKEN)
        .add_query_param("startDate", "2001-01-01")
        .add_query_param("endDate", "2001-12-31")
        .await
        .json();
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_status_filter_matches_legacy_casing() {
    let app = spawn_app();
    let placed = app.place_default_order().await;
    let id = Uuid::parse_str(placed["order_id"].as_str().unwrap()).unwrap();
    app.db.update_order_status(&id, "Cancelled").await.unwrap();

    let body: Value = bearer(app.server.get("/api/admin/reports/orders"), ADMIN_TOKEN)
        .add_query_param("status", "cancelled")
        .await
        .json();
    assert_eq!(body["count"], 1);

    let body: Value = bearer(app.server.get("/api/admin/orders"), ADMIN_TOKEN)
        .add_query_param("status", "CANCELLED")
        .await
        .json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["orders"][0]["id"], placed["order_id"]);
}

#[tokio::test]
async fn test_report_rejects_inverted_range() {
    let app = spawn_app();

    let response = bearer(app.server.get("/api/admin/reports/orders"), ADMIN_TOKEN)
        .add_query_param("startDate", "2025-03-01")
        .add_query_param("endDate", "2025-02-01")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"]["fields"][0]["field"], "startDate");

    bearer(app.server.get("/api/admin/reports/orders"), ADMIN_TOKEN)
        .add_query_param("startDate", "March 1st")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Admin whitelist
// ============================================================================

#[tokio::test]
async fn test_invite_grants_admin_access() {
    let app = spawn_app();

    let response = bearer(app.server.post("/api/admin/invite"), ADMIN_TOKEN)
        .json(&json!({ "email": " Fan@Example.com ", "full_name": "Fan" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["admin"]["email"], "fan@example.com");
    assert_eq!(body["admin"]["invited_by"], ADMIN_EMAIL);

    // USER_TOKEN belongs to fan@example.com
    bearer(app.server.get("/api/admin/orders"), USER_TOKEN)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_invite_is_idempotent() {
    let app = spawn_app();

    for _ in 0..2 {
        bearer(app.server.post("/api/admin/invite"), ADMIN_TOKEN)
            .json(&json!({ "email": "staff@noventaycinco.store" }))
            .await
            .assert_status_ok();
    }

    let body: Value = bearer(app.server.get("/api/admin/users"), ADMIN_TOKEN)
        .await
        .json();
    let emails: Vec<&str> = body["admins"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["email"].as_str().unwrap())
        .collect();
    assert_eq!(
        emails
            .iter()
            .filter(|e| **e == "staff@noventaycinco.store")
            .count(),
        1
    );
    assert!(emails.contains(&ADMIN_EMAIL));
}

#[tokio::test]
async fn test_invite_rejects_bad_email() {
    let app = spawn_app();

    let response = bearer(app.server.post("/api/admin/invite"), ADMIN_TOKEN)
        .json(&json!({ "email": "not an email" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["details"]["fields"][0]["field"], "email");

    bearer(app.server.post("/api/admin/invite"), USER_TOKEN)
        .json(&json!({ "email": "someone@example.com" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}
