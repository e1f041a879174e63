//! Public order tracking
//!
//! Customers type whatever they have: the full id from the confirmation
//! email, the 8-character order number, or either with spaces and dashes.
//! The input is turned into a closed id range and the newest order inside
//! that range is returned as a customer-safe projection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::entity::{ItemLabels, Order, OrderItem, PersonalizationType};
use crate::core::error::{EntityError, StoreResult, StorageError, ValidationError};
use crate::core::service::{CatalogService, OrderService};
use crate::orders::status::{StatusDescriptor, describe};

/// Hex digits in a UUID
const UUID_HEX_LEN: usize = 32;

/// Closed range of ids that start with the hex digits found in `raw`
///
/// Non-hex characters are dropped, the rest is lowercased and cut to 32
/// digits, then right-padded with `0` for the lower bound and `f` for the
/// upper bound. Returns `None` when `raw` has no hex digit at all.
pub fn id_range(raw: &str) -> Option<(Uuid, Uuid)> {
    let hex: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .take(UUID_HEX_LEN)
        .collect();
    if hex.is_empty() {
        return None;
    }

    let lower = format!("{:0<width$}", hex, width = UUID_HEX_LEN);
    let upper = format!("{:f<width$}", hex, width = UUID_HEX_LEN);
    Some((Uuid::parse_str(&lower).ok()?, Uuid::parse_str(&upper).ok()?))
}

/// Order as shown on the public tracking page
///
/// Carries no email, phone or street address.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedOrder {
    pub id: Uuid,
    pub order_number: String,
    pub customer_first_name: String,
    /// `municipality, department`
    pub shipping_location: String,
    pub status: String,
    pub status_info: StatusDescriptor,
    pub subtotal: f64,
    pub deposit_amount: f64,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TrackedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedItem {
    pub product_name: Option<String>,
    pub team_name: Option<String>,
    pub variant_name: Option<String>,
    pub size: Option<String>,
    pub patch: Option<String>,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personalization: Option<TrackedPersonalization>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedPersonalization {
    #[serde(rename = "type")]
    pub kind: PersonalizationType,
    pub name: Option<String>,
    pub number: Option<String>,
}

impl TrackedOrder {
    pub fn project(order: &Order, items: &[OrderItem], labels: Vec<ItemLabels>) -> Self {
        let items = items
            .iter()
            .zip(labels.into_iter().chain(std::iter::repeat_with(ItemLabels::default)))
            .map(|(item, labels)| TrackedItem::project(item, labels))
            .collect();

        Self {
            id: order.id,
            order_number: order.order_number(),
            customer_first_name: order.customer_first_name().to_string(),
            shipping_location: format!(
                "{}, {}",
                order.shipping_municipality, order.shipping_department
            ),
            status: order.status.clone(),
            status_info: describe(&order.status),
            subtotal: order.subtotal,
            deposit_amount: order.deposit_amount,
            total_amount: order.total_amount,
            created_at: order.created_at,
            items,
        }
    }
}

impl TrackedItem {
    fn project(item: &OrderItem, labels: ItemLabels) -> Self {
        let personalization = match item.personalization_type {
            PersonalizationType::None => None,
            PersonalizationType::Player => Some(TrackedPersonalization {
                kind: PersonalizationType::Player,
                name: item.custom_name.clone().or(labels.player_name),
                number: item.custom_number.clone().or(labels.player_number),
            }),
            PersonalizationType::Custom => Some(TrackedPersonalization {
                kind: PersonalizationType::Custom,
                name: item.custom_name.clone(),
                number: item.custom_number.clone(),
            }),
        };

        Self {
            product_name: labels.product_name,
            team_name: labels.team_name,
            variant_name: labels.variant_name,
            size: labels.size_label,
            patch: labels.patch_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            personalization,
        }
    }
}

/// Read path behind `GET /api/orders/track`
#[derive(Clone)]
pub struct TrackingLookup {
    orders: Arc<dyn OrderService>,
    catalog: Arc<dyn CatalogService>,
}

impl TrackingLookup {
    pub fn new(orders: Arc<dyn OrderService>, catalog: Arc<dyn CatalogService>) -> Self {
        Self { orders, catalog }
    }

    /// Resolve a free-text identifier to one order
    pub async fn track(&self, raw: Option<&str>) -> StoreResult<TrackedOrder> {
        let raw = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
            ValidationError::MissingArgument {
                argument: "id".to_string(),
            }
        })?;

        let (lower, upper) = id_range(raw).ok_or_else(|| ValidationError::FieldError {
            field: "id".to_string(),
            message: "must contain hexadecimal characters".to_string(),
        })?;

        let order = self
            .orders
            .find_order_in_range(&lower, &upper)
            .await
            .map_err(|e| StorageError::query("look up order", format!("{:#}", e)))?
            .ok_or(EntityError::OrderNotFound)?;

        let items = self
            .orders
            .items_for_order(&order.id)
            .await
            .map_err(|e| StorageError::query("load order items", format!("{:#}", e)))?;

        // Labels are cosmetic; a failed lookup still shows the order
        let labels = match self.catalog.describe_items(&items).await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "could not resolve item labels");
                Vec::new()
            }
        };

        tracing::debug!(order_id = %order.id, "order tracked");
        Ok(TrackedOrder::project(&order, &items, labels))
    }
}
