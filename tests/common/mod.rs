//! Shared fixtures for the HTTP integration tests
//!
//! Every test gets its own `InMemoryStore`, seeded with a tiny catalog, and a
//! `TestServer` wrapping the real router.

#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestRequest, TestServer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use store::prelude::*;

pub const ADMIN_EMAIL: &str = "ops@noventaycinco.store";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_TOKEN: &str = "fan-token";

/// Ids of the seeded catalog
pub struct Catalog {
    pub product_id: Uuid,
    /// Priced at 500
    pub fan_variant: Uuid,
    /// Priced at 1250
    pub player_variant: Uuid,
    pub size_m: Uuid,
    pub player_id: Uuid,
}

pub struct TestApp {
    pub server: TestServer,
    pub db: InMemoryStore,
    pub mailer: RecordingMailer,
    pub catalog: Catalog,
}

pub fn seed_catalog(db: &InMemoryStore) -> Catalog {
    let league = db.add_league("Liga Nacional de Honduras");
    let team = db.add_team("Olimpia", Some(league));
    let product_id = db.add_product("Olimpia Local 2025", Some(team));
    Catalog {
        product_id,
        fan_variant: db.add_variant(product_id, "Fan", 500.0),
        player_variant: db.add_variant(product_id, "Jugador", 1250.0),
        size_m: db.add_size("M"),
        player_id: db.add_player(Some(team), "Jerry Bengtson", Some("27")),
    }
}

/// Default test configuration: generous rate limit, fast email retries
pub fn test_config() -> StoreConfig {
    let mut config = StoreConfig::default();
    config.rate_limit.max_requests = 100;
    config.notifications.admin_email = Some("ventas@noventaycinco.store".to_string());
    config.notifications.retry_backoff_ms = 1;
    config
        .auth
        .static_tokens
        .insert(ADMIN_TOKEN.to_string(), ADMIN_EMAIL.to_string());
    config
        .auth
        .static_tokens
        .insert(USER_TOKEN.to_string(), "fan@example.com".to_string());
    config
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), RecordingMailer::new())
}

/// Must be called from inside a tokio runtime
pub fn spawn_app_with(config: StoreConfig, mailer: RecordingMailer) -> TestApp {
    let db = InMemoryStore::new();
    db.add_admin(ADMIN_EMAIL);
    let catalog = seed_catalog(&db);

    let router = ServerBuilder::new()
        .with_config(config)
        .with_in_memory_store(db.clone())
        .with_mailer(Arc::new(mailer.clone()))
        .build()
        .unwrap();

    TestApp {
        server: TestServer::new(router),
        db,
        mailer,
        catalog,
    }
}

/// A valid checkout body for one line
pub fn order_payload(variant_id: Uuid, product_id: Uuid, quantity: u32) -> Value {
    json!({
        "customer_name": "Ana López",
        "customer_email": "Ana@Example.com",
        "customer_phone": "9988-7766",
        "shipping_department": "Francisco Morazán",
        "shipping_municipality": "Tegucigalpa",
        "shipping_address": "Col. Palmira, casa 12",
        "payment_method": "transfer",
        "items": [{
            "product_id": product_id.to_string(),
            "variant_id": variant_id.to_string(),
            "quantity": quantity,
            "personalization_type": "none",
        }],
    })
}

pub fn bearer(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

pub fn from_ip(request: TestRequest, ip: &'static str) -> TestRequest {
    request.add_header(
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_static(ip),
    )
}

impl TestApp {
    /// Place a valid order and return the response body
    pub async fn place_order(&self, variant_id: Uuid, quantity: u32) -> Value {
        let response = self
            .server
            .post("/api/orders/create")
            .json(&order_payload(variant_id, self.catalog.product_id, quantity))
            .await;
        response.assert_status_ok();
        response.json()
    }

    pub async fn place_default_order(&self) -> Value {
        self.place_order(self.catalog.fan_variant, 2).await
    }

    /// Wait until the recording mailer holds `count` messages
    pub async fn wait_for_emails(&self, count: usize) -> Vec<store::notify::EmailMessage> {
        for _ in 0..200 {
            let sent = self.mailer.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.mailer.sent()
    }
}
