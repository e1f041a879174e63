//! Core module containing the records, traits and errors shared by the store

pub mod auth;
pub mod entity;
pub mod error;
pub mod events;
pub mod field;
pub mod query;
pub mod service;

pub use auth::{AuthContext, AuthPolicy, AuthProvider, NoAuthProvider, StaticTokenAuthProvider};
pub use entity::{Order, OrderGraph, OrderItem, Payment, PaymentStatus, PersonalizationType};
pub use error::{AdminError, StoreError, StoreResult};
pub use events::{EventBus, StoreEvent};
pub use field::FieldFormat;
pub use query::{OrderFilter, ReportParams};
pub use service::{AdminDirectory, CatalogService, OrderService, RateDecision, RateLimiter};
