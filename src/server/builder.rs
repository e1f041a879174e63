//! ServerBuilder for fluent API to build the HTTP server

use super::host::ServerHost;
use super::rate_limit::InMemoryRateLimiter;
use super::router::build_app;
use crate::config::StoreConfig;
use crate::core::auth::{AuthProvider, StaticTokenAuthProvider};
use crate::core::events::EventBus;
use crate::core::service::{AdminDirectory, CatalogService, OrderService, RateLimiter};
use crate::notify::{LogMailer, Mailer, NotificationDispatcher};
use crate::storage::InMemoryStore;
use anyhow::{Result, anyhow};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for the store server
///
/// # Example
///
/// ```ignore
/// let store = InMemoryStore::new();
/// store.seed_demo();
///
/// ServerBuilder::new()
///     .with_config(config)
///     .with_in_memory_store(store)
///     .serve("127.0.0.1:3000")
///     .await?;
/// ```
pub struct ServerBuilder {
    config: StoreConfig,
    catalog: Option<Arc<dyn CatalogService>>,
    orders: Option<Arc<dyn OrderService>>,
    admins: Option<Arc<dyn AdminDirectory>>,
    auth: Option<Arc<dyn AuthProvider>>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    mailer: Option<Arc<dyn Mailer>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with the default configuration
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            catalog: None,
            orders: None,
            admins: None,
            auth: None,
            rate_limiter: None,
            mailer: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Use one in-memory store for catalog, orders and the admin whitelist
    pub fn with_in_memory_store(self, store: InMemoryStore) -> Self {
        self.with_catalog_service(Arc::new(store.clone()))
            .with_order_service(Arc::new(store.clone()))
            .with_admin_directory(Arc::new(store))
    }

    /// Set the catalog service (required)
    pub fn with_catalog_service(mut self, service: Arc<dyn CatalogService>) -> Self {
        self.catalog = Some(service);
        self
    }

    /// Set the order service (required)
    pub fn with_order_service(mut self, service: Arc<dyn OrderService>) -> Self {
        self.orders = Some(service);
        self
    }

    /// Set the admin whitelist (required)
    pub fn with_admin_directory(mut self, directory: Arc<dyn AdminDirectory>) -> Self {
        self.admins = Some(directory);
        self
    }

    /// Set the identity provider
    ///
    /// Defaults to the static token table of the configuration.
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    /// Set the checkout rate limiter
    ///
    /// Defaults to an [`InMemoryRateLimiter`] built from the configuration.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Set the email transport; defaults to [`LogMailer`]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Add custom routes to the server
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the shared host
    pub fn build_host(&self) -> Result<ServerHost> {
        let catalog = self.catalog.clone().ok_or_else(|| {
            anyhow!("CatalogService is required. Call .with_catalog_service() or .with_in_memory_store()")
        })?;
        let orders = self.orders.clone().ok_or_else(|| {
            anyhow!("OrderService is required. Call .with_order_service() or .with_in_memory_store()")
        })?;
        let admins = self.admins.clone().ok_or_else(|| {
            anyhow!("AdminDirectory is required. Call .with_admin_directory() or .with_in_memory_store()")
        })?;

        let auth = self.auth.clone().unwrap_or_else(|| {
            Arc::new(StaticTokenAuthProvider::new(
                self.config.auth.static_tokens.clone(),
            ))
        });
        let rate_limiter = self.rate_limiter.clone().unwrap_or_else(|| {
            Arc::new(InMemoryRateLimiter::from_config(&self.config.rate_limit))
        });

        Ok(ServerHost {
            config: Arc::new(self.config.clone()),
            catalog,
            orders,
            admins,
            auth,
            rate_limiter,
            event_bus: Arc::new(EventBus::new(self.config.server.event_bus_capacity)),
        })
    }

    /// Build the router and start the notification dispatcher
    ///
    /// Must be called inside a tokio runtime when notifications are enabled.
    pub fn build(mut self) -> Result<Router> {
        let host = Arc::new(self.build_host()?);

        if self.config.notifications.enabled {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(anyhow!(
                    "build() must run inside a tokio runtime to start the notification dispatcher"
                ));
            }
            let mailer = self.mailer.take().unwrap_or_else(|| Arc::new(LogMailer));
            NotificationDispatcher::new(
                mailer,
                host.catalog.clone(),
                self.config.notifications.clone(),
            )
            .spawn(&host.event_bus);
        }

        let custom_routes = std::mem::take(&mut self.custom_routes);
        Ok(build_app(host, custom_routes))
    }

    /// Serve the application with graceful shutdown
    ///
    /// Handles SIGTERM and SIGINT (Ctrl+C).
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
