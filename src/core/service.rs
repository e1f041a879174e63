//! Service traits for the external store
//!
//! The store owns all durable state. These traits are the only way the
//! workflow reaches it, so backends (in-memory, Postgres) are interchangeable.

use crate::core::entity::{
    AdminRecord, ItemLabels, Order, OrderGraph, OrderItem, Payment, PaymentStatus,
    ProductListing, VariantPrice,
};
use crate::core::query::OrderFilter;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// Read-only access to catalog reference data
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Look up the current price of every listed variant in one batch
    ///
    /// Variants that do not exist are simply absent from the result.
    async fn variant_prices(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, VariantPrice>>;

    /// Resolve display names for order items, in the same order
    async fn describe_items(&self, items: &[OrderItem]) -> Result<Vec<ItemLabels>>;

    /// Active products with their priced variants
    async fn list_products(&self) -> Result<Vec<ProductListing>>;
}

/// Order, item and payment persistence
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Whether [`OrderService::insert_order_graph`] is available
    ///
    /// Stores without multi-statement atomicity return `false` and the
    /// workflow falls back to step-by-step writes with compensating deletes.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Insert order, items and payment atomically
    async fn insert_order_graph(&self, _graph: &OrderGraph) -> Result<()> {
        anyhow::bail!("this store does not support atomic order writes")
    }

    /// Insert the order row
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Insert all items of an order; either every row is written or none
    async fn insert_items(&self, items: &[OrderItem]) -> Result<()>;

    /// Insert a payment row
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    /// Delete an order row (compensation only)
    async fn delete_order(&self, order_id: &Uuid) -> Result<()>;

    /// Delete the items of an order (compensation only)
    async fn delete_items(&self, order_id: &Uuid) -> Result<()>;

    /// Get an order by ID
    async fn get_order(&self, id: &Uuid) -> Result<Option<Order>>;

    /// Find one order whose id lies in `[lower, upper]`
    ///
    /// When several match, the most recently created one is returned.
    async fn find_order_in_range(&self, lower: &Uuid, upper: &Uuid) -> Result<Option<Order>>;

    /// List orders matching a filter, newest first
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Items of an order
    async fn items_for_order(&self, order_id: &Uuid) -> Result<Vec<OrderItem>>;

    /// Items of several orders, grouped by order id
    async fn items_for_orders(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>>;

    /// Payments of an order
    async fn payments_for_order(&self, order_id: &Uuid) -> Result<Vec<Payment>>;

    /// Overwrite the status of an order
    async fn update_order_status(&self, id: &Uuid, status: &str) -> Result<Option<Order>>;

    /// Set `to` only if the order currently has status `from`
    ///
    /// Returns whether a row was changed.
    async fn advance_order_status(&self, id: &Uuid, from: &str, to: &str) -> Result<bool>;

    /// Get a payment by ID
    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>>;

    /// Overwrite the status of a payment
    async fn update_payment_status(
        &self,
        id: &Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>>;
}

/// Admin whitelist kept next to the identity provider
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// Whether the email belongs to a whitelisted admin (case-insensitive)
    async fn is_admin(&self, email: &str) -> Result<bool>;

    /// Add or refresh a whitelist entry
    async fn upsert_admin(&self, record: AdminRecord) -> Result<AdminRecord>;

    /// All whitelisted admins
    async fn list_admins(&self) -> Result<Vec<AdminRecord>>;
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request allowed; `remaining` more fit in the current window
    Allowed { remaining: u32 },

    /// Budget exhausted until the window resets
    Limited { retry_after_secs: u64 },
}

/// Fixed-window request counter keyed by client
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `key` and say whether it may proceed
    async fn check(&self, key: &str) -> Result<RateDecision>;
}
