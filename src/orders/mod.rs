//! The order workflow: checkout, pricing, persistence, tracking and the
//! back-office status actions

pub mod admin;
pub mod handlers;
pub mod pricing;
pub mod request;
pub mod status;
pub mod tracking;
pub mod writer;

pub use pricing::{PricedLine, PricingResolver};
pub use request::{CreateOrderRequest, ValidatedOrder};
pub use status::{OrderStatus, StatusDescriptor, describe};
pub use tracking::{TrackedOrder, TrackingLookup};
pub use writer::{OrderWriter, PlacedOrder};
