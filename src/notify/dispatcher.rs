//! Background task turning order events into emails

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::NotificationConfig;
use crate::core::entity::{ItemLabels, Order, OrderItem};
use crate::core::events::{EventBus, OrderEvent, StoreEvent};
use crate::core::service::CatalogService;
use crate::notify::mailer::{EmailMessage, Mailer};
use crate::notify::templates::{OrderSummary, admin_notification, customer_confirmation};

/// Sends the customer confirmation and the admin notification for new orders
///
/// Runs outside the request path: a failed email never affects the order that
/// triggered it. Each message is retried with exponential backoff and given up
/// after `max_attempts`.
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    catalog: Arc<dyn CatalogService>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        catalog: Arc<dyn CatalogService>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            mailer,
            catalog,
            config,
        }
    }

    /// Subscribe to the bus and process events until it closes
    ///
    /// The subscription is taken before this returns, so every event published
    /// afterwards is seen.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut receiver = bus.subscribe();
        tokio::spawn(async move {
            tracing::debug!("notification dispatcher started");
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        self.handle(&envelope.event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notification dispatcher lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("notification dispatcher stopped");
        })
    }

    /// Handle a single event and return how many emails were delivered
    ///
    /// Anything but a new order is ignored.
    pub async fn handle(&self, event: &StoreEvent) -> usize {
        if !self.config.enabled {
            return 0;
        }
        if let StoreEvent::Order(OrderEvent::Created {
            order,
            items,
            payment_method,
            ..
        }) = event
        {
            return self.order_created(order, items, payment_method).await;
        }
        0
    }

    async fn order_created(
        &self,
        order: &Order,
        items: &[OrderItem],
        payment_method: &str,
    ) -> usize {
        let labels = match self.catalog.describe_items(items).await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "item labels unavailable for email");
                vec![ItemLabels::default(); items.len()]
            }
        };
        let summary = OrderSummary {
            order,
            items,
            labels: &labels,
            payment_method,
        };

        let mut messages = vec![(
            "customer_confirmation",
            customer_confirmation(&self.config, &summary),
        )];
        if let Some(admin) = admin_notification(&self.config, &summary) {
            messages.push(("admin_notification", admin));
        }

        let total = messages.len();
        let mut delivered = 0;
        for (kind, message) in messages {
            if self.deliver(kind, order, message).await {
                delivered += 1;
            }
        }

        if delivered == total {
            tracing::debug!(order_id = %order.id, delivered, "order notifications sent");
        } else {
            tracing::warn!(
                order_id = %order.id,
                delivered,
                failed = total - delivered,
                "some order notifications were not delivered"
            );
        }
        delivered
    }

    async fn deliver(&self, kind: &str, order: &Order, message: EmailMessage) -> bool {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.mailer.send(&message).await {
                Ok(()) => {
                    tracing::info!(order_id = %order.id, kind, attempt, "email sent");
                    return true;
                }
                Err(e) if attempt < attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        order_id = %order.id,
                        kind,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "email failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %order.id,
                        kind,
                        attempts,
                        error = %e,
                        "email given up"
                    );
                }
            }
        }
        false
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt - 1).min(16);
        Duration::from_millis(self.config.retry_backoff_ms.saturating_mul(factor))
    }
}
