//! HTTP server: builder, shared host, routes and checkout throttling

pub mod builder;
pub mod host;
pub mod rate_limit;
pub mod router;

pub use builder::ServerBuilder;
pub use host::{AppState, ServerHost};
pub use rate_limit::{InMemoryRateLimiter, client_key};
