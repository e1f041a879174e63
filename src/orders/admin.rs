//! Back-office endpoints
//!
//! Every route here requires a whitelisted admin session and answers with
//! [`AdminError`], which exposes the raw diagnostic message.
//!
//! - `GET /api/admin/orders?status=&limit=`
//! - `GET /api/admin/orders/{id}`
//! - `PATCH /api/admin/orders/{id}/status`
//! - `PATCH /api/admin/payments/{id}/status`
//! - `GET /api/admin/reports/orders?startDate=&endDate=&status=`
//! - `POST /api/admin/invite`

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::core::auth::AuthPolicy;
use crate::core::entity::{AdminRecord, Order, OrderItem, PaymentStatus};
use crate::core::error::{AdminError, EntityError, StorageError, TransitionError, ValidationError};
use crate::core::events::{AdminEvent, OrderEvent, PaymentEvent, StoreEvent};
use crate::core::field::{FieldFormat, non_blank};
use crate::core::query::{ListParams, ReportParams};
use crate::orders::status::{OrderStatus, StatusDescriptor, describe, plan_transition};
use crate::server::host::AppState;

type AdminResult<T> = Result<T, AdminError>;

/// Body of `PATCH /api/admin/orders/{id}/status`
#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: String,
    /// Accept a move outside the transition table
    #[serde(default)]
    pub force: bool,
}

/// Body of `PATCH /api/admin/payments/{id}/status`
#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: String,
}

/// Body of `POST /api/admin/invite`
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Order with its mapped status, as listed in the back office
#[derive(Debug, Serialize)]
pub struct AdminOrder {
    #[serde(flatten)]
    pub order: Order,
    pub order_number: String,
    pub status_info: StatusDescriptor,
}

impl From<Order> for AdminOrder {
    fn from(order: Order) -> Self {
        Self {
            order_number: order.order_number(),
            status_info: describe(&order.status),
            order,
        }
    }
}

/// One row of the orders report
#[derive(Debug, Serialize)]
pub struct ReportRow {
    #[serde(flatten)]
    pub order: Order,
    pub order_number: String,
    pub items: Vec<OrderItem>,
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ValidationError::FieldError {
        field: field.to_string(),
        message: format!("'{}' is not a valid id", raw),
    })
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> AdminResult<T> {
    Ok(serde_json::from_slice(body)?)
}

fn storage(operation: &'static str) -> impl Fn(anyhow::Error) -> StorageError {
    move |e| StorageError::query(operation, format!("{:#}", e))
}

/// List orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> AdminResult<Json<Value>> {
    state.authorize(&headers, AuthPolicy::AdminOnly).await?;

    let orders: Vec<AdminOrder> = state
        .orders
        .list_orders(&params.to_filter())
        .await
        .map_err(storage("list orders"))?
        .into_iter()
        .map(AdminOrder::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": orders.len(),
        "orders": orders,
    })))
}

/// One order with its items and payments
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AdminResult<Json<Value>> {
    state.authorize(&headers, AuthPolicy::AdminOnly).await?;
    let id = parse_id(&id, "id")?;

    let order = state
        .orders
        .get_order(&id)
        .await
        .map_err(storage("get order"))?
        .ok_or_else(|| EntityError::not_found("order", id))?;
    let items = state
        .orders
        .items_for_order(&id)
        .await
        .map_err(storage("load order items"))?;
    let labels = state
        .catalog
        .describe_items(&items)
        .await
        .map_err(storage("describe order items"))?;
    let payments = state
        .orders
        .payments_for_order(&id)
        .await
        .map_err(storage("load payments"))?;

    Ok(Json(json!({
        "success": true,
        "order": AdminOrder::from(order),
        "items": items,
        "item_labels": labels,
        "payments": payments,
    })))
}

/// Change the status of an order
///
/// Moves outside the transition table answer 409 unless `force` is set.
/// A move is only applied while the order still has the status it was
/// planned from, so a concurrent change also answers 409. Asking for the
/// current status changes nothing.
pub async fn update_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> AdminResult<Json<Value>> {
    let context = state.authorize(&headers, AuthPolicy::AdminOnly).await?;
    let id = parse_id(&id, "id")?;
    let request: OrderStatusRequest = parse_body(&body)?;

    let requested =
        OrderStatus::from_code(&request.status).ok_or_else(|| TransitionError::UnknownStatus {
            value: request.status.clone(),
        })?;

    let order = state
        .orders
        .get_order(&id)
        .await
        .map_err(storage("get order"))?
        .ok_or_else(|| EntityError::not_found("order", id))?;

    let Some(plan) = plan_transition(&order.status, requested, request.force)? else {
        return Ok(Json(json!({
            "success": true,
            "changed": false,
            "order": AdminOrder::from(order),
        })));
    };

    let updated = if plan.forced {
        state
            .orders
            .update_order_status(&id, plan.to.code())
            .await
            .map_err(storage("update order status"))?
            .ok_or_else(|| EntityError::not_found("order", id))?
    } else {
        // The move was planned from `plan.from`; only apply it if the
        // order still has that status.
        let applied = state
            .orders
            .advance_order_status(&id, &plan.from, plan.to.code())
            .await
            .map_err(storage("update order status"))?;
        let current = state
            .orders
            .get_order(&id)
            .await
            .map_err(storage("get order"))?
            .ok_or_else(|| EntityError::not_found("order", id))?;
        if !applied {
            tracing::warn!(
                order_id = %id,
                planned_from = %plan.from,
                stored = %current.status,
                to = plan.to.code(),
                "order status changed concurrently, update refused"
            );
            return Err(TransitionError::NotAllowed {
                from: current.status,
                to: plan.to.code().to_string(),
            }
            .into());
        }
        current
    };

    tracing::info!(
        order_id = %id,
        from = %plan.from,
        to = plan.to.code(),
        forced = plan.forced,
        admin = context.email().unwrap_or_default(),
        "order status updated"
    );

    let event = StoreEvent::Order(OrderEvent::StatusChanged {
        order_id: id,
        from: plan.from,
        to: plan.to.code().to_string(),
        forced: plan.forced,
    });
    let revalidate = event.revalidate_paths();
    state.event_bus.publish(event);

    Ok(Json(json!({
        "success": true,
        "changed": true,
        "order": AdminOrder::from(updated),
        "revalidate": revalidate,
    })))
}

/// Change the status of a payment
///
/// Completing a deposit moves its order from `pending_payment_50` to
/// `deposit_paid`, but only while the order is still in that state.
pub async fn update_payment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> AdminResult<Json<Value>> {
    let context = state.authorize(&headers, AuthPolicy::AdminOnly).await?;
    let id = parse_id(&id, "id")?;
    let request: PaymentStatusRequest = parse_body(&body)?;

    let status = PaymentStatus::parse(&request.status).ok_or_else(|| {
        ValidationError::FieldError {
            field: "status".to_string(),
            message: format!(
                "'{}' is not one of pending, completed, failed",
                request.status
            ),
        }
    })?;

    let payment = state
        .orders
        .get_payment(&id)
        .await
        .map_err(storage("get payment"))?
        .ok_or_else(|| EntityError::not_found("payment", id))?;
    let previous = payment.status;

    let payment = state
        .orders
        .update_payment_status(&id, status)
        .await
        .map_err(storage("update payment status"))?
        .ok_or_else(|| EntityError::not_found("payment", id))?;

    let order_advanced = if payment.is_deposit() && status == PaymentStatus::Completed {
        state
            .orders
            .advance_order_status(
                &payment.order_id,
                OrderStatus::PendingPayment50.code(),
                OrderStatus::DepositPaid.code(),
            )
            .await
            .map_err(storage("advance order status"))?
    } else {
        false
    };

    tracing::info!(
        payment_id = %id,
        order_id = %payment.order_id,
        from = previous.as_str(),
        to = status.as_str(),
        order_advanced,
        admin = context.email().unwrap_or_default(),
        "payment status updated"
    );

    let event = StoreEvent::Payment(PaymentEvent::StatusChanged {
        payment_id: id,
        order_id: payment.order_id,
        from: previous.as_str().to_string(),
        to: status.as_str().to_string(),
        order_advanced,
    });
    let revalidate = event.revalidate_paths();
    state.event_bus.publish(event);

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "order_advanced": order_advanced,
        "revalidate": revalidate,
    })))
}

/// Orders with their items, for spreadsheet export on the client
pub async fn orders_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReportParams>,
) -> AdminResult<Json<Value>> {
    state.authorize(&headers, AuthPolicy::AdminOnly).await?;
    let filter = params.to_filter()?;

    let orders = state
        .orders
        .list_orders(&filter)
        .await
        .map_err(storage("list orders"))?;
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut items = state
        .orders
        .items_for_orders(&ids)
        .await
        .map_err(storage("load order items"))?;

    let rows: Vec<ReportRow> = orders
        .into_iter()
        .map(|order| ReportRow {
            order_number: order.order_number(),
            items: items.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": rows.len(),
        "orders": rows,
    })))
}

/// Add an email to the admin whitelist
///
/// Inviting an address twice refreshes the record instead of failing.
pub async fn invite_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AdminResult<Json<Value>> {
    let context = state.authorize(&headers, AuthPolicy::AdminOnly).await?;
    let request: InviteRequest = parse_body(&body)?;

    let email = request.email.trim().to_lowercase();
    if !FieldFormat::Email.validate(&email) {
        return Err(ValidationError::FieldError {
            field: "email".to_string(),
            message: format!("'{}' is not a valid email address", request.email),
        }
        .into());
    }

    let invited_by = context.email().map(str::to_string);
    let record = state
        .admins
        .upsert_admin(AdminRecord {
            email: email.clone(),
            full_name: non_blank(request.full_name.as_deref()),
            invited_by: invited_by.clone(),
            created_at: Utc::now(),
        })
        .await
        .map_err(storage("invite admin"))?;

    tracing::info!(email = %email, invited_by = ?invited_by, "admin invited");
    state
        .event_bus
        .publish(StoreEvent::Admin(AdminEvent::Invited { email, invited_by }));

    Ok(Json(json!({
        "success": true,
        "admin": record,
    })))
}

/// Current whitelist
pub async fn list_admins(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AdminResult<Json<Value>> {
    state.authorize(&headers, AuthPolicy::AdminOnly).await?;
    let admins = state
        .admins
        .list_admins()
        .await
        .map_err(storage("list admins"))?;
    Ok(Json(json!({
        "success": true,
        "count": admins.len(),
        "admins": admins,
    })))
}
