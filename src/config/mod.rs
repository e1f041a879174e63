//! Configuration loading and management
//!
//! Every section has defaults, so an empty YAML document is a valid
//! development configuration. Secrets are usually supplied through the
//! environment, see [`StoreConfig::apply_env`].

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Complete configuration of the store service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub server: ServerConfig,
    pub orders: OrdersConfig,
    pub rate_limit: RateLimitConfig,
    pub notifications: NotificationConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:3000`
    pub bind: String,

    /// Buffer size of the event bus broadcast channel
    pub event_bus_capacity: usize,

    /// Allowed CORS origins; empty means any origin
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            event_bus_capacity: 1024,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Checkout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
    /// Fraction of the subtotal required as deposit, in `(0, 1]`
    pub deposit_percentage: f64,

    /// Provider label stored on payment records
    pub payment_provider: String,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            deposit_percentage: 0.5,
            payment_provider: "manual".to_string(),
        }
    }
}

/// Throttling of the checkout endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client and window
    pub max_requests: u32,

    pub window_secs: u64,

    /// Tracked clients above which the in-memory limiter drops stale entries
    pub max_tracked_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 60,
            max_tracked_clients: 10_000,
        }
    }
}

/// Email notifications sent after an order is placed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// Sender, e.g. `90+5 Store <pedidos@example.com>`
    pub from: String,

    /// Recipient of the new-order notification; none means no admin email
    pub admin_email: Option<String>,

    pub resend_api_base: String,

    pub resend_api_key: Option<String>,

    /// Attempts per email, first one included
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry
    pub retry_backoff_ms: u64,

    pub store_name: String,

    /// Public tracking page; the order number is appended as `?id=`
    pub tracking_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from: "90+5 Store <pedidos@noventaycinco.store>".to_string(),
            admin_email: None,
            resend_api_base: "https://api.resend.com".to_string(),
            resend_api_key: None,
            max_attempts: 3,
            retry_backoff_ms: 500,
            store_name: "90+5 Store".to_string(),
            tracking_url: None,
        }
    }
}

/// Identity provider settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token to email, for development only
    pub static_tokens: HashMap<String, String>,

    /// Whitelisted at startup so a fresh deployment has someone to send invites
    pub admin_emails: Vec<String>,

    pub supabase_url: Option<String>,

    pub supabase_anon_key: Option<String>,
}

/// Postgres connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; none means the in-memory store
    pub url: Option<String>,

    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path.display(), e),
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.display().to_string()),
            message: e.to_string(),
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            file: None,
            message: e.to_string(),
        })
    }

    /// Override settings from environment variables
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`StoreConfig::apply_env`] with an explicit lookup
    pub fn apply_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(bind) = var("STORE_BIND") {
            self.server.bind = bind;
        }
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = var("RESEND_API_KEY") {
            self.notifications.resend_api_key = Some(key);
        }
        if let Some(url) = var("SUPABASE_URL") {
            self.auth.supabase_url = Some(url);
        }
        if let Some(key) = var("SUPABASE_ANON_KEY") {
            self.auth.supabase_anon_key = Some(key);
        }
        if let Some(pct) = var("DEPOSIT_PERCENTAGE") {
            self.orders.deposit_percentage =
                pct.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "DEPOSIT_PERCENTAGE".to_string(),
                    value: pct.clone(),
                    message: "expected a number".to_string(),
                })?;
        }
        Ok(self)
    }

    /// Check values that have no sensible fallback
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pct = self.orders.deposit_percentage;
        if !(pct > 0.0 && pct <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "orders.deposit_percentage".to_string(),
                value: pct.to_string(),
                message: "must be greater than 0 and at most 1".to_string(),
            });
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.max_requests".to_string(),
                value: "0".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.window_secs".to_string(),
                value: "0".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit.max_tracked_clients == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.max_tracked_clients".to_string(),
                value: "0".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.notifications.enabled && self.notifications.from.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "notifications.from".to_string(),
                value: String::new(),
                message: "a sender address is required when notifications are enabled"
                    .to_string(),
            });
        }
        Ok(())
    }
}
