//! Public storefront endpoints
//!
//! - `POST /api/orders/create`
//! - `GET /api/orders/track?id=`
//! - `GET /api/catalog/products`

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::error::{RequestError, StorageError, StoreResult};
use crate::core::events::{OrderEvent, StoreEvent};
use crate::core::service::RateDecision;
use crate::orders::pricing::PricingResolver;
use crate::orders::request::{CreateOrderRequest, is_honeypot};
use crate::orders::tracking::{TrackedOrder, TrackingLookup};
use crate::orders::writer::{OrderWriter, PlacedOrder};
use crate::server::host::AppState;
use crate::server::rate_limit::client_key;

/// Success body of `POST /api/orders/create`
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    #[serde(flatten)]
    pub order: PlacedOrder,
}

/// Success body of `GET /api/orders/track`
#[derive(Debug, Serialize)]
pub struct TrackOrderResponse {
    pub success: bool,
    pub order: TrackedOrder,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct TrackParams {
    pub id: Option<String>,
}

/// Place an order
///
/// Steps, in order: throttle, parse, honeypot check, validate, price, write,
/// publish. Nothing is written unless validation and pricing both succeed.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StoreResult<Response> {
    let client = client_key(&headers);
    match state.rate_limiter.check(&client).await {
        Ok(RateDecision::Allowed { .. }) => {}
        Ok(RateDecision::Limited { retry_after_secs }) => {
            tracing::warn!(client = %client, retry_after_secs, "order creation rate limited");
            return Err(RequestError::RateLimited { retry_after_secs }.into());
        }
        Err(e) => {
            // fail open: throttling is best effort
            tracing::warn!(client = %client, error = %e, "rate limiter unavailable");
        }
    }

    let payload: Value = serde_json::from_slice(&body)?;
    if is_honeypot(&payload) {
        tracing::warn!(client = %client, "honeypot field filled, order discarded");
        return Ok(Json(json!({ "success": true })).into_response());
    }

    let request: CreateOrderRequest = serde_json::from_value(payload)?;
    let validated = request.validate()?;

    let priced = PricingResolver::new(state.catalog.clone())
        .resolve(validated.lines)
        .await?;

    let writer = OrderWriter::new(
        state.orders.clone(),
        state.config.orders.deposit_percentage,
        state.config.orders.payment_provider.clone(),
    );
    let graph = writer.build_graph(&validated.customer, &validated.payment_method, &priced);
    writer.write(&graph).await?;

    let placed = PlacedOrder::from(&graph);
    tracing::info!(
        order_id = %placed.order_id,
        order_number = %placed.order_number,
        total = placed.total,
        items = graph.items.len(),
        "order created"
    );

    state.event_bus.publish(StoreEvent::Order(OrderEvent::Created {
        order: graph.order,
        items: graph.items,
        payment_id: graph.payment.id,
        payment_method: validated.payment_method,
    }));

    let response = CreateOrderResponse {
        success: true,
        order: placed,
    };
    Ok(Json(response).into_response())
}

/// Look up an order by full or partial id; no session required
pub async fn track_order(
    State(state): State<AppState>,
    Query(params): Query<TrackParams>,
) -> StoreResult<Json<TrackOrderResponse>> {
    let order = TrackingLookup::new(state.orders.clone(), state.catalog.clone())
        .track(params.id.as_deref())
        .await?;
    Ok(Json(TrackOrderResponse {
        success: true,
        order,
    }))
}

/// Active products with their priced variants
pub async fn list_products(State(state): State<AppState>) -> StoreResult<Json<Value>> {
    let products = state
        .catalog
        .list_products()
        .await
        .map_err(|e| StorageError::query("list products", format!("{:#}", e)))?;
    Ok(Json(json!({
        "success": true,
        "count": products.len(),
        "products": products,
    })))
}
