//! PostgreSQL storage backend using sqlx.
//!
//! Provides [`PostgresStore`] (catalog, orders, admin whitelist) and
//! [`PostgresRateLimiter`] backed by a `sqlx::PgPool`.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag.
//!
//! # Schema
//!
//! Tables are created by the migrations in `migrations/`, applied with
//! [`PostgresStore::migrate`]. Money columns are `double precision`.
//!
//! Unlike the in-memory store, new orders are written in a single
//! transaction, so the order writer never needs its compensating path here.

use crate::core::entity::{
    AdminRecord, ItemLabels, Order, OrderGraph, OrderItem, Payment, PaymentStatus,
    PersonalizationType, Product, ProductListing, Variant, VariantPrice,
};
use crate::core::query::OrderFilter;
use crate::core::service::{
    AdminDirectory, CatalogService, OrderService, RateDecision, RateLimiter,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    shipping_department: String,
    shipping_municipality: String,
    shipping_address: String,
    status: String,
    subtotal: f64,
    deposit_amount: f64,
    total_amount: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            shipping_department: row.shipping_department,
            shipping_municipality: row.shipping_municipality,
            shipping_address: row.shipping_address,
            status: row.status,
            subtotal: row.subtotal,
            deposit_amount: row.deposit_amount,
            total_amount: row.total_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    size_id: Option<Uuid>,
    patch_id: Option<Uuid>,
    player_id: Option<Uuid>,
    quantity: i32,
    unit_price: f64,
    personalization_type: String,
    custom_name: Option<String>,
    custom_number: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = anyhow::Error;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            size_id: row.size_id,
            patch_id: row.patch_id,
            player_id: row.player_id,
            quantity: u32::try_from(row.quantity)
                .map_err(|_| anyhow!("item {} has negative quantity", row.id))?,
            unit_price: row.unit_price,
            personalization_type: PersonalizationType::parse(&row.personalization_type)
                .unwrap_or_default(),
            custom_name: row.custom_name,
            custom_number: row.custom_number,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    payment_type: String,
    amount: f64,
    status: String,
    provider: String,
    method: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = anyhow::Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Payment {
            status: PaymentStatus::parse(&row.status)
                .ok_or_else(|| anyhow!("payment {} has unknown status '{}'", row.id, row.status))?,
            id: row.id,
            order_id: row.order_id,
            payment_type: row.payment_type,
            amount: row.amount,
            provider: row.provider,
            method: row.method,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LabelRow {
    product_name: Option<String>,
    team_name: Option<String>,
    variant_name: Option<String>,
    size_label: Option<String>,
    patch_name: Option<String>,
    player_name: Option<String>,
    player_number: Option<String>,
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    team_id: Option<Uuid>,
    category_id: Option<Uuid>,
    image_url: Option<String>,
    active: bool,
    team: Option<String>,
    league: Option<String>,
    category: Option<String>,
}

#[derive(FromRow)]
struct AdminRow {
    email: String,
    full_name: Option<String>,
    invited_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AdminRow> for AdminRecord {
    fn from(row: AdminRow) -> Self {
        AdminRecord {
            email: row.email,
            full_name: row.full_name,
            invited_by: row.invited_by,
            created_at: row.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, customer_name, customer_email, customer_phone, \
     shipping_department, shipping_municipality, shipping_address, status, \
     subtotal, deposit_amount, total_amount, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, size_id, patch_id, \
     player_id, quantity, unit_price, personalization_type, custom_name, custom_number, created_at";

const PAYMENT_COLUMNS: &str = "id, order_id, type AS payment_type, amount, status, provider, \
     method, notes, created_at, updated_at";

// ---------------------------------------------------------------------------
// PostgresStore
// ---------------------------------------------------------------------------

/// Store backed by PostgreSQL
///
/// # Example
///
/// ```rust,ignore
/// let store = PostgresStore::connect("postgres://localhost/store", 10).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(|e| anyhow!("Failed to connect to Postgres: {}", e))?;
        Ok(Self::new(pool))
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to run migrations: {}", e))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_order_in<'e, E>(executor: E, order: &Order) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.customer_phone)
        .bind(&order.shipping_department)
        .bind(&order.shipping_municipality)
        .bind(&order.shipping_address)
        .bind(&order.status)
        .bind(order.subtotal)
        .bind(order.deposit_amount)
        .bind(order.total_amount)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(executor)
        .await
        .map_err(|e| anyhow!("Failed to insert order: {}", e))?;
        Ok(())
    }

    async fn insert_items_in(tx: &mut Transaction<'_, Postgres>, items: &[OrderItem]) -> Result<()> {
        for item in items {
            let quantity = i32::try_from(item.quantity)
                .map_err(|_| anyhow!("quantity {} is too large", item.quantity))?;
            sqlx::query(&format!(
                "INSERT INTO order_items ({}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
                ITEM_COLUMNS
            ))
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.size_id)
            .bind(item.patch_id)
            .bind(item.player_id)
            .bind(quantity)
            .bind(item.unit_price)
            .bind(item.personalization_type.as_str())
            .bind(&item.custom_name)
            .bind(&item.custom_number)
            .bind(item.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| anyhow!("Failed to insert order item: {}", e))?;
        }
        Ok(())
    }

    async fn insert_payment_in<'e, E>(executor: E, payment: &Payment) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "INSERT INTO payments \
             (id, order_id, type, amount, status, provider, method, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.payment_type)
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.provider)
        .bind(&payment.method)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(executor)
        .await
        .map_err(|e| anyhow!("Failed to insert payment: {}", e))?;
        Ok(())
    }

    async fn fetch_items(&self, sql: &str, order_ids: &[Uuid]) -> Result<Vec<OrderItem>> {
        sqlx::query_as::<_, ItemRow>(sql)
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to load order items: {}", e))?
            .into_iter()
            .map(OrderItem::try_from)
            .collect()
    }
}

#[async_trait]
impl CatalogService for PostgresStore {
    async fn variant_prices(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, VariantPrice>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, f64)>(
            "SELECT id, product_id, price FROM product_variants \
             WHERE id = ANY($1) AND active",
        )
        .bind(variant_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to look up variant prices: {}", e))?;

        Ok(rows
            .into_iter()
            .map(|(variant_id, product_id, price)| {
                (
                    variant_id,
                    VariantPrice {
                        variant_id,
                        product_id,
                        price,
                    },
                )
            })
            .collect())
    }

    async fn describe_items(&self, items: &[OrderItem]) -> Result<Vec<ItemLabels>> {
        let mut labels = Vec::with_capacity(items.len());
        for item in items {
            let row = sqlx::query_as::<_, LabelRow>(
                "SELECT p.name AS product_name, t.name AS team_name, v.name AS variant_name, \
                        s.label AS size_label, pa.name AS patch_name, \
                        pl.name AS player_name, pl.number AS player_number \
                 FROM (SELECT 1) AS one \
                 LEFT JOIN products p ON p.id = $1 \
                 LEFT JOIN teams t ON t.id = p.team_id \
                 LEFT JOIN product_variants v ON v.id = $2 \
                 LEFT JOIN sizes s ON s.id = $3 \
                 LEFT JOIN patches pa ON pa.id = $4 \
                 LEFT JOIN players pl ON pl.id = $5",
            )
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.size_id)
            .bind(item.patch_id)
            .bind(item.player_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to resolve item labels: {}", e))?;

            labels.push(ItemLabels {
                product_name: row.product_name,
                team_name: row.team_name,
                variant_name: row.variant_name,
                size_label: row.size_label,
                patch_name: row.patch_name,
                player_name: row.player_name,
                player_number: row.player_number,
            });
        }
        Ok(labels)
    }

    async fn list_products(&self) -> Result<Vec<ProductListing>> {
        let products = sqlx::query_as::<_, ProductRow>(
            "SELECT p.id, p.name, p.slug, p.team_id, p.category_id, p.image_url, p.active, \
                    t.name AS team, l.name AS league, c.name AS category \
             FROM products p \
             LEFT JOIN teams t ON t.id = p.team_id \
             LEFT JOIN leagues l ON l.id = t.league_id \
             LEFT JOIN categories c ON c.id = p.category_id \
             WHERE p.active \
             ORDER BY p.name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to list products: {}", e))?;

        let variants = sqlx::query_as::<_, (Uuid, Uuid, String, f64, bool)>(
            "SELECT id, product_id, name, price, active FROM product_variants \
             WHERE active ORDER BY price",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to list variants: {}", e))?;

        let mut by_product: HashMap<Uuid, Vec<Variant>> = HashMap::new();
        for (id, product_id, name, price, active) in variants {
            by_product.entry(product_id).or_default().push(Variant {
                id,
                product_id,
                name,
                price,
                active,
            });
        }

        Ok(products
            .into_iter()
            .map(|row| ProductListing {
                variants: by_product.remove(&row.id).unwrap_or_default(),
                product: Product {
                    id: row.id,
                    name: row.name,
                    slug: row.slug,
                    team_id: row.team_id,
                    category_id: row.category_id,
                    image_url: row.image_url,
                    active: row.active,
                },
                team: row.team,
                league: row.league,
                category: row.category,
            })
            .collect())
    }
}

#[async_trait]
impl OrderService for PostgresStore {
    fn supports_transactions(&self) -> bool {
        true
    }

    async fn insert_order_graph(&self, graph: &OrderGraph) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;

        Self::insert_order_in(&mut *tx, &graph.order).await?;
        Self::insert_items_in(&mut tx, &graph.items).await?;
        Self::insert_payment_in(&mut *tx, &graph.payment).await?;

        tx.commit()
            .await
            .map_err(|e| anyhow!("Failed to commit order: {}", e))
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        Self::insert_order_in(&self.pool, order).await
    }

    async fn insert_items(&self, items: &[OrderItem]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| anyhow!("Failed to begin transaction: {}", e))?;
        Self::insert_items_in(&mut tx, items).await?;
        tx.commit()
            .await
            .map_err(|e| anyhow!("Failed to commit order items: {}", e))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        Self::insert_payment_in(&self.pool, payment).await
    }

    async fn delete_order(&self, order_id: &Uuid) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to delete order: {}", e))?;
        Ok(())
    }

    async fn delete_items(&self, order_id: &Uuid) -> Result<()> {
        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to delete order items: {}", e))?;
        Ok(())
    }

    async fn get_order(&self, id: &Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to get order: {}", e))?;
        Ok(row.map(Order::from))
    }

    async fn find_order_in_range(&self, lower: &Uuid, upper: &Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id >= $1 AND id <= $2 \
             ORDER BY created_at DESC LIMIT 1",
            ORDER_COLUMNS
        ))
        .bind(lower)
        .bind(upper)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to look up order: {}", e))?;
        Ok(row.map(Order::from))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let limit = filter
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders \
             WHERE ($1::timestamptz IS NULL OR created_at >= $1) \
               AND ($2::timestamptz IS NULL OR created_at <= $2) \
               AND ($3::text[] IS NULL OR lower(status) = ANY($3)) \
             ORDER BY created_at DESC \
             LIMIT $4",
            ORDER_COLUMNS
        ))
        .bind(filter.created_from)
        .bind(filter.created_to)
        .bind(filter.statuses.as_ref().map(|statuses| {
            statuses
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect::<Vec<_>>()
        }))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to list orders: {}", e))?;
        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn items_for_order(&self, order_id: &Uuid) -> Result<Vec<OrderItem>> {
        self.fetch_items(
            &format!(
                "SELECT {} FROM order_items WHERE order_id = ANY($1) ORDER BY created_at",
                ITEM_COLUMNS
            ),
            std::slice::from_ref(order_id),
        )
        .await
    }

    async fn items_for_orders(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let items = self
            .fetch_items(
                &format!(
                    "SELECT {} FROM order_items WHERE order_id = ANY($1) ORDER BY created_at",
                    ITEM_COLUMNS
                ),
                order_ids,
            )
            .await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn payments_for_order(&self, order_id: &Uuid) -> Result<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to load payments: {}", e))?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    async fn update_order_status(&self, id: &Uuid, status: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to update order status: {}", e))?;
        Ok(row.map(Order::from))
    }

    async fn advance_order_status(&self, id: &Uuid, from: &str, to: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to advance order status: {}", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to get payment: {}", e))?
        .map(Payment::try_from)
        .transpose()
    }

    async fn update_payment_status(
        &self,
        id: &Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to update payment status: {}", e))?
        .map(Payment::try_from)
        .transpose()
    }
}

#[async_trait]
impl AdminDirectory for PostgresStore {
    async fn is_admin(&self, email: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM admin_users WHERE lower(email) = lower($1))",
        )
        .bind(email.trim())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to check admin whitelist: {}", e))?;
        Ok(found)
    }

    async fn upsert_admin(&self, record: AdminRecord) -> Result<AdminRecord> {
        let row = sqlx::query_as::<_, AdminRow>(
            "INSERT INTO admin_users (email, full_name, invited_by, created_at) \
             VALUES (lower($1), $2, $3, $4) \
             ON CONFLICT (email) DO UPDATE \
               SET full_name = COALESCE(EXCLUDED.full_name, admin_users.full_name) \
             RETURNING email, full_name, invited_by, created_at",
        )
        .bind(record.email.trim())
        .bind(&record.full_name)
        .bind(&record.invited_by)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to upsert admin: {}", e))?;
        Ok(row.into())
    }

    async fn list_admins(&self) -> Result<Vec<AdminRecord>> {
        let rows = sqlx::query_as::<_, AdminRow>(
            "SELECT email, full_name, invited_by, created_at FROM admin_users ORDER BY email",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to list admins: {}", e))?;
        Ok(rows.into_iter().map(AdminRecord::from).collect())
    }
}

// ---------------------------------------------------------------------------
// PostgresRateLimiter
// ---------------------------------------------------------------------------

/// Fixed-window limiter shared by every instance using the same database
#[derive(Clone, Debug)]
pub struct PostgresRateLimiter {
    pool: PgPool,
    max_requests: u32,
    window_secs: u64,
}

impl PostgresRateLimiter {
    pub fn new(pool: PgPool, max_requests: u32, window_secs: u64) -> Self {
        Self {
            pool,
            max_requests,
            window_secs: window_secs.max(1),
        }
    }

    /// Drop windows that ended before `now`
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_end < now()")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to purge rate limits: {}", e))?;
        Ok(result.rows_affected())
    }

    /// Purge expired windows every `period` until the task is aborted
    pub fn spawn_purge(&self, period: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match limiter.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => {
                        tracing::debug!(purged, "expired rate-limit windows removed")
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to purge rate-limit windows"),
                }
            }
        })
    }
}

#[async_trait]
impl RateLimiter for PostgresRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision> {
        let window = i64::try_from(self.window_secs).unwrap_or(i64::MAX);
        let (count, retry_after) = sqlx::query_as::<_, (i32, i64)>(
            "INSERT INTO rate_limits (client_key, count, window_end) \
             VALUES ($1, 1, now() + make_interval(secs => $2)) \
             ON CONFLICT (client_key) DO UPDATE SET \
               count = CASE WHEN rate_limits.window_end <= now() THEN 1 \
                            ELSE rate_limits.count + 1 END, \
               window_end = CASE WHEN rate_limits.window_end <= now() \
                                 THEN now() + make_interval(secs => $2) \
                                 ELSE rate_limits.window_end END \
             RETURNING count, CEIL(EXTRACT(EPOCH FROM (window_end - now())))::bigint",
        )
        .bind(key)
        .bind(window as f64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to count request: {}", e))?;

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        if count > self.max_requests {
            Ok(RateDecision::Limited {
                retry_after_secs: u64::try_from(retry_after).unwrap_or(1).max(1),
            })
        } else {
            Ok(RateDecision::Allowed {
                remaining: self.max_requests - count,
            })
        }
    }
}
