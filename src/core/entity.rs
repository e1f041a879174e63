//! Records owned by the external store
//!
//! Orders, their items and payments are written by the order workflow; the
//! catalog records (products, variants, teams, ...) are read-only lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orders::status::OrderStatus;

/// Payment type created when an order is placed
pub const PAYMENT_TYPE_DEPOSIT: &str = "deposit";

/// A customer order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_department: String,
    pub shipping_municipality: String,
    pub shipping_address: String,
    /// Opaque status code, see [`OrderStatus`] for the known values
    pub status: String,
    pub subtotal: f64,
    pub deposit_amount: f64,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Short human reference: first 8 hex characters of the id, uppercased
    pub fn order_number(&self) -> String {
        order_number(&self.id)
    }

    /// Parsed status, `None` when the stored code is not a known one
    pub fn parsed_status(&self) -> Option<OrderStatus> {
        OrderStatus::from_code(&self.status)
    }

    /// First word of the customer name
    pub fn customer_first_name(&self) -> &str {
        self.customer_name.split_whitespace().next().unwrap_or("")
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Short order reference for an id
pub fn order_number(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

/// Personalization printed on a jersey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersonalizationType {
    #[default]
    None,
    Player,
    Custom,
}

impl PersonalizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonalizationType::None => "none",
            PersonalizationType::Player => "player",
            PersonalizationType::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(PersonalizationType::None),
            "player" => Some(PersonalizationType::Player),
            "custom" => Some(PersonalizationType::Custom),
            _ => None,
        }
    }
}

/// A line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub size_id: Option<Uuid>,
    pub patch_id: Option<Uuid>,
    pub player_id: Option<Uuid>,
    pub quantity: u32,
    /// Authoritative variant price at order time
    pub unit_price: f64,
    pub personalization_type: PersonalizationType,
    pub custom_name: Option<String>,
    pub custom_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

/// Status of a payment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// A payment recorded against an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Payment type, `deposit` for the one created with the order
    #[serde(rename = "type")]
    pub payment_type: String,
    pub amount: f64,
    pub status: PaymentStatus,
    pub provider: String,
    pub method: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_deposit(&self) -> bool {
        self.payment_type == PAYMENT_TYPE_DEPOSIT
    }
}

/// Everything written for one new order
#[derive(Debug, Clone)]
pub struct OrderGraph {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Payment,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub league_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub team_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub active: bool,
}

/// A purchasable version of a product; carries the authoritative price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub id: Uuid,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub team_id: Option<Uuid>,
    pub name: String,
    pub number: Option<String>,
}

/// Authoritative price of a variant, as returned by the batch lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantPrice {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub price: f64,
}

/// Display names resolved for an order item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemLabels {
    pub product_name: Option<String>,
    pub team_name: Option<String>,
    pub variant_name: Option<String>,
    pub size_label: Option<String>,
    pub patch_name: Option<String>,
    pub player_name: Option<String>,
    pub player_number: Option<String>,
}

/// Public catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: Product,
    pub team: Option<String>,
    pub league: Option<String>,
    pub category: Option<String>,
    pub variants: Vec<Variant>,
}

/// A whitelisted back-office user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminRecord {
    pub email: String,
    pub full_name: Option<String>,
    pub invited_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
