//! Route table of the store

use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::orders::{admin, handlers};
use crate::server::host::AppState;

/// Storefront and back-office routes
///
/// - `POST /api/orders/create`
/// - `GET /api/orders/track`
/// - `GET /api/catalog/products`
/// - `GET /api/admin/orders`, `GET /api/admin/orders/{id}`
/// - `PATCH /api/admin/orders/{id}/status`
/// - `PATCH /api/admin/payments/{id}/status`
/// - `GET /api/admin/reports/orders`
/// - `POST /api/admin/invite`, `GET /api/admin/users`
pub fn build_store_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/orders/create", post(handlers::create_order))
        .route("/api/orders/track", get(handlers::track_order))
        .route("/api/catalog/products", get(handlers::list_products))
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/{id}", get(admin::get_order))
        .route(
            "/api/admin/orders/{id}/status",
            patch(admin::update_order_status),
        )
        .route(
            "/api/admin/payments/{id}/status",
            patch(admin::update_payment_status),
        )
        .route("/api/admin/reports/orders", get(admin::orders_report))
        .route("/api/admin/invite", post(admin::invite_admin))
        .route("/api/admin/users", get(admin::list_admins))
        .with_state(state)
}

/// Build health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ninety-five-store"
    }))
}

/// CORS policy; an empty origin list allows any origin
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Assemble the full application router
pub fn build_app(state: AppState, custom_routes: Vec<Router>) -> Router {
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    let mut app = health_routes().merge(build_store_routes(state));
    for custom_router in custom_routes {
        app = app.merge(custom_router);
    }

    app.layer(cors).layer(TraceLayer::new_for_http())
}
