//! Persistence of a new order: order row, item rows, deposit payment
//!
//! Stores that support multi-statement transactions get the whole graph in
//! one atomic write. Other stores get the three inserts in sequence, and a
//! failed step deletes whatever the earlier steps committed, newest first,
//! so an order never survives without both its items and its payment.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::entity::{
    Order, OrderGraph, OrderItem, PAYMENT_TYPE_DEPOSIT, Payment, PaymentStatus, order_number,
};
use crate::core::error::StorageError;
use crate::core::service::OrderService;
use crate::orders::pricing::{PricedLine, subtotal};
use crate::orders::request::CustomerDetails;
use crate::orders::status::OrderStatus;

/// Summary returned to the storefront after a successful write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub order_number: String,
    pub total: f64,
    pub deposit: f64,
    pub payment_id: Uuid,
}

impl From<&OrderGraph> for PlacedOrder {
    fn from(graph: &OrderGraph) -> Self {
        Self {
            order_id: graph.order.id,
            order_number: graph.order.order_number(),
            total: graph.order.total_amount,
            deposit: graph.order.deposit_amount,
            payment_id: graph.payment.id,
        }
    }
}

/// Rows already committed by the step-by-step path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Committed {
    Order,
    Items,
}

/// Writes validated, priced orders to the store
#[derive(Clone)]
pub struct OrderWriter {
    orders: Arc<dyn OrderService>,
    deposit_percentage: f64,
    payment_provider: String,
}

impl OrderWriter {
    pub fn new(
        orders: Arc<dyn OrderService>,
        deposit_percentage: f64,
        payment_provider: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            deposit_percentage,
            payment_provider: payment_provider.into(),
        }
    }

    /// Build the rows of a new order without touching the store
    pub fn build_graph(
        &self,
        customer: &CustomerDetails,
        payment_method: &str,
        lines: &[PricedLine],
    ) -> OrderGraph {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let subtotal = subtotal(lines);
        let deposit = subtotal * self.deposit_percentage;

        let order = Order {
            id: order_id,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            customer_phone: customer.phone.clone(),
            shipping_department: customer.shipping_department.clone(),
            shipping_municipality: customer.shipping_municipality.clone(),
            shipping_address: customer.shipping_address.clone(),
            status: OrderStatus::INITIAL.code().to_string(),
            subtotal,
            deposit_amount: deposit,
            total_amount: subtotal,
            created_at: now,
            updated_at: now,
        };

        let items = lines
            .iter()
            .map(|priced| OrderItem {
                id: Uuid::new_v4(),
                order_id,
                product_id: priced.line.product_id,
                variant_id: Some(priced.line.variant_id),
                size_id: priced.line.size_id,
                patch_id: priced.line.patch_id,
                player_id: priced.line.player_id,
                quantity: priced.line.quantity,
                unit_price: priced.unit_price,
                personalization_type: priced.line.personalization_type,
                custom_name: priced.line.custom_name.clone(),
                custom_number: priced.line.custom_number.clone(),
                created_at: now,
            })
            .collect();

        let payment = Payment {
            id: Uuid::new_v4(),
            order_id,
            payment_type: PAYMENT_TYPE_DEPOSIT.to_string(),
            amount: deposit,
            status: PaymentStatus::Pending,
            provider: self.payment_provider.clone(),
            method: payment_method.to_string(),
            notes: Some(format!(
                "Anticipo {}% del pedido #{}",
                (self.deposit_percentage * 100.0).round(),
                order_number(&order_id)
            )),
            created_at: now,
            updated_at: now,
        };

        OrderGraph {
            order,
            items,
            payment,
        }
    }

    /// Persist a graph built by [`OrderWriter::build_graph`]
    pub async fn write(&self, graph: &OrderGraph) -> Result<(), StorageError> {
        if self.orders.supports_transactions() {
            return self
                .orders
                .insert_order_graph(graph)
                .await
                .map_err(|e| StorageError::TransactionError {
                    message: format!("{:#}", e),
                });
        }
        self.write_stepwise(graph).await
    }

    async fn write_stepwise(&self, graph: &OrderGraph) -> Result<(), StorageError> {
        let order_id = graph.order.id;

        self.orders
            .insert_order(&graph.order)
            .await
            .map_err(|e| StorageError::query("insert order", format!("{:#}", e)))?;

        if let Err(err) = self.orders.insert_items(&graph.items).await {
            return Err(self
                .compensate(order_id, "order_items", err, &[Committed::Order])
                .await);
        }

        if let Err(err) = self.orders.insert_payment(&graph.payment).await {
            return Err(self
                .compensate(
                    order_id,
                    "payment",
                    err,
                    &[Committed::Order, Committed::Items],
                )
                .await);
        }

        Ok(())
    }

    /// Undo committed steps in reverse order and describe the outcome
    async fn compensate(
        &self,
        order_id: Uuid,
        step: &str,
        cause: anyhow::Error,
        committed: &[Committed],
    ) -> StorageError {
        let message = format!("{:#}", cause);
        tracing::warn!(%order_id, step, error = %message, "insert failed, rolling back order");

        let mut rollback_errors = Vec::new();
        for undo in committed.iter().rev() {
            let result = match undo {
                Committed::Items => self.orders.delete_items(&order_id).await,
                Committed::Order => self.orders.delete_order(&order_id).await,
            };
            if let Err(e) = result {
                rollback_errors.push(format!("{:?}: {:#}", undo, e));
            }
        }

        if rollback_errors.is_empty() {
            StorageError::RolledBack {
                step: step.to_string(),
                message,
            }
        } else {
            let rollback_message = rollback_errors.join("; ");
            tracing::error!(
                %order_id,
                step,
                error = %message,
                rollback_error = %rollback_message,
                "rollback failed, order rows may be orphaned"
            );
            StorageError::RollbackFailed {
                step: step.to_string(),
                message,
                rollback_message,
            }
        }
    }
}
