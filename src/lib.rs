//! # 90+5 Store
//!
//! Order workflow service for a football jersey shop: checkout with
//! authoritative pricing and a deposit payment, public order tracking,
//! back-office status management and order notifications.
//!
//! ## Features
//!
//! - **Authoritative pricing**: unit prices always come from the catalog, never from the cart
//! - **All-or-nothing writes**: one transaction where the store supports it, compensating deletes otherwise
//! - **Status workflow**: explicit transition table with an admin override
//! - **Partial-id tracking**: an order prefix is enough to find an order
//! - **Decoupled notifications**: emails are sent from the event bus, with retries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use store::prelude::*;
//!
//! let store = InMemoryStore::new();
//! store.seed_demo();
//!
//! ServerBuilder::new()
//!     .with_config(StoreConfig::default())
//!     .with_in_memory_store(store)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod notify;
pub mod orders;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthPolicy, AuthProvider, NoAuthProvider, StaticTokenAuthProvider},
        entity::{
            AdminRecord, ItemLabels, Order, OrderGraph, OrderItem, Payment, PaymentStatus,
            PersonalizationType,
        },
        error::{AdminError, StoreError, StoreResult},
        events::{EventBus, StoreEvent},
        service::{AdminDirectory, CatalogService, OrderService, RateDecision, RateLimiter},
    };

    #[cfg(feature = "supabase-auth")]
    pub use crate::core::auth::SupabaseAuthProvider;

    // === Configuration ===
    pub use crate::config::StoreConfig;

    // === Order workflow ===
    pub use crate::orders::{OrderStatus, OrderWriter, PricingResolver, TrackingLookup};

    // === Notifications ===
    #[cfg(feature = "email")]
    pub use crate::notify::ResendMailer;
    pub use crate::notify::{LogMailer, Mailer, NotificationDispatcher, RecordingMailer};

    // === Server ===
    pub use crate::server::{AppState, InMemoryRateLimiter, ServerBuilder, ServerHost};

    // === Storage ===
    pub use crate::storage::InMemoryStore;
    #[cfg(feature = "postgres")]
    pub use crate::storage::{PostgresRateLimiter, PostgresStore};

    // === Common external types ===
    pub use anyhow::Result;
    pub use uuid::Uuid;
}
