//! Internal event system
//!
//! The EventBus decouples committed writes from their side effects. Handlers
//! publish after the store has accepted a write; the notification dispatcher
//! (and anything else that cares, such as cache layers in front of the admin
//! pages) subscribes.
//!
//! ```text
//! POST /api/orders/create ──┐
//!                           ├──▶ EventBus::publish() ──▶ broadcast channel ──▶ NotificationDispatcher
//! admin status updates ─────┘                                               ──▶ other subscribers
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::entity::{Order, OrderItem};

/// Events related to orders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrderEvent {
    /// An order and all its rows were committed
    Created {
        order: Order,
        items: Vec<OrderItem>,
        payment_id: Uuid,
        payment_method: String,
    },
    /// An admin changed the status of an order
    StatusChanged {
        order_id: Uuid,
        from: String,
        to: String,
        forced: bool,
    },
}

/// Events related to payments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PaymentEvent {
    /// An admin changed the status of a payment
    StatusChanged {
        payment_id: Uuid,
        order_id: Uuid,
        from: String,
        to: String,
        /// Whether the owning order moved to `deposit_paid` as a consequence
        order_advanced: bool,
    },
}

/// Events related to back-office users
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminEvent {
    /// An email was added to (or refreshed in) the admin whitelist
    Invited {
        email: String,
        invited_by: Option<String>,
    },
}

/// Top-level store event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
    Admin(AdminEvent),
}

impl StoreEvent {
    pub fn event_kind(&self) -> &str {
        match self {
            StoreEvent::Order(_) => "order",
            StoreEvent::Payment(_) => "payment",
            StoreEvent::Admin(_) => "admin",
        }
    }

    /// Get the action name
    pub fn action(&self) -> &str {
        match self {
            StoreEvent::Order(OrderEvent::Created { .. }) => "created",
            StoreEvent::Order(OrderEvent::StatusChanged { .. }) => "status_changed",
            StoreEvent::Payment(PaymentEvent::StatusChanged { .. }) => "status_changed",
            StoreEvent::Admin(AdminEvent::Invited { .. }) => "invited",
        }
    }

    /// Order this event relates to, if any
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            StoreEvent::Order(OrderEvent::Created { order, .. }) => Some(order.id),
            StoreEvent::Order(OrderEvent::StatusChanged { order_id, .. })
            | StoreEvent::Payment(PaymentEvent::StatusChanged { order_id, .. }) => Some(*order_id),
            StoreEvent::Admin(_) => None,
        }
    }

    /// Admin pages whose cached rendering is stale after this event
    pub fn revalidate_paths(&self) -> Vec<String> {
        match self {
            StoreEvent::Order(_) => {
                let mut paths = vec!["/admin/orders".to_string()];
                if let Some(id) = self.order_id() {
                    paths.push(format!("/admin/orders/{}", id));
                }
                paths
            }
            StoreEvent::Payment(PaymentEvent::StatusChanged { order_id, .. }) => vec![
                "/admin/payments".to_string(),
                "/admin/orders".to_string(),
                format!("/admin/orders/{}", order_id),
            ],
            StoreEvent::Admin(_) => vec!["/admin/users".to_string()],
        }
    }
}

/// Envelope wrapping a store event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: StoreEvent,
}

impl EventEnvelope {
    pub fn new(event: StoreEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// Uses `tokio::sync::broadcast`, so any number of subscribers each see every
/// event published after they subscribed. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start losing events (lagged).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails and never blocks. Returns the number of receivers.
    pub fn publish(&self, event: StoreEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            kind = envelope.event.event_kind(),
            action = envelope.event.action(),
            "publishing event"
        );
        // send() returns Err only if there are no receivers
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
