//! Server host holding the shared application state
//!
//! Every handler receives an [`AppState`], a cheap handle to one
//! `ServerHost`. The host owns the service seams (catalog, orders, admin
//! whitelist, identity, throttling) and the event bus; it knows nothing about
//! which backend sits behind each of them.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::config::StoreConfig;
use crate::core::auth::{AuthContext, AuthPolicy, AuthProvider};
use crate::core::error::StoreError;
use crate::core::events::EventBus;
use crate::core::service::{AdminDirectory, CatalogService, OrderService, RateLimiter};

/// State shared by all handlers
pub type AppState = Arc<ServerHost>;

/// Host context containing all service state
pub struct ServerHost {
    pub config: Arc<StoreConfig>,

    pub catalog: Arc<dyn CatalogService>,

    pub orders: Arc<dyn OrderService>,

    pub admins: Arc<dyn AdminDirectory>,

    pub auth: Arc<dyn AuthProvider>,

    /// Throttles order creation
    pub rate_limiter: Arc<dyn RateLimiter>,

    /// Committed writes are published here for the notification dispatcher
    pub event_bus: Arc<EventBus>,
}

impl ServerHost {
    /// Resolve the caller and check it against `policy`
    ///
    /// Anonymous callers get 401, authenticated callers outside the admin
    /// whitelist get 403 on admin-only routes.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        policy: AuthPolicy,
    ) -> Result<AuthContext, StoreError> {
        let context = self
            .auth
            .extract_context(headers)
            .await?
            .resolve_admin(self.admins.as_ref())
            .await?;
        policy.enforce(&context)?;
        Ok(context)
    }
}
