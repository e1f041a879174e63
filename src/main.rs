//! store-server: runs the 90+5 Store order service
//!
//! Configuration comes from the YAML file named by the first argument or
//! `STORE_CONFIG`, then environment overrides. Without a database URL (or
//! without the `postgres` feature) a demo catalog is served from memory.

use anyhow::Result;
use std::sync::Arc;
use store::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,store=debug")),
        )
        .init();

    let config = load_config()?;
    let bind = config.server.bind.clone();

    let builder = ServerBuilder::new()
        .with_auth_provider(auth_provider(&config))
        .with_mailer(mailer(&config)?);
    let (builder, admins) = with_storage(builder, &config).await?;

    seed_admins(admins.as_ref(), &config.auth.admin_emails).await?;

    tracing::info!(
        deposit_percentage = config.orders.deposit_percentage,
        notifications = config.notifications.enabled,
        "starting 90+5 Store"
    );

    builder.with_config(config).serve(&bind).await
}

fn load_config() -> Result<StoreConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STORE_CONFIG").ok());

    let config = match path {
        Some(path) => {
            tracing::info!(path = %path, "loading configuration");
            StoreConfig::from_yaml_file(&path)?
        }
        None => {
            tracing::info!("no configuration file given, using defaults");
            StoreConfig::default()
        }
    };

    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "postgres")]
async fn with_storage(
    builder: ServerBuilder,
    config: &StoreConfig,
) -> Result<(ServerBuilder, Arc<dyn AdminDirectory>)> {
    use anyhow::Context;

    if let Some(url) = &config.database.url {
        let store = PostgresStore::connect(url, config.database.max_connections)
            .await
            .context("connecting to Postgres")?;
        store.migrate().await?;
        tracing::info!("using Postgres storage");

        let limiter = PostgresRateLimiter::new(
            store.pool().clone(),
            config.rate_limit.max_requests,
            config.rate_limit.window_secs,
        );
        limiter.spawn_purge(std::time::Duration::from_secs(
            config.rate_limit.window_secs.max(1),
        ));
        let store = Arc::new(store);
        let builder = builder
            .with_catalog_service(store.clone())
            .with_order_service(store.clone())
            .with_admin_directory(store.clone())
            .with_rate_limiter(Arc::new(limiter));
        let admins: Arc<dyn AdminDirectory> = store;
        return Ok((builder, admins));
    }
    Ok(in_memory(builder))
}

#[cfg(not(feature = "postgres"))]
async fn with_storage(
    builder: ServerBuilder,
    config: &StoreConfig,
) -> Result<(ServerBuilder, Arc<dyn AdminDirectory>)> {
    if config.database.url.is_some() {
        tracing::warn!("database.url is set but the postgres feature is disabled");
    }
    Ok(in_memory(builder))
}

fn in_memory(builder: ServerBuilder) -> (ServerBuilder, Arc<dyn AdminDirectory>) {
    let store = InMemoryStore::new();
    store.seed_demo();
    tracing::info!("using in-memory storage with demo catalog");
    let admins: Arc<dyn AdminDirectory> = Arc::new(store.clone());
    (builder.with_in_memory_store(store), admins)
}

async fn seed_admins(admins: &dyn AdminDirectory, emails: &[String]) -> Result<()> {
    for email in emails {
        let email = email.trim().to_lowercase();
        if email.is_empty() || admins.is_admin(&email).await? {
            continue;
        }
        admins
            .upsert_admin(AdminRecord {
                email: email.clone(),
                full_name: None,
                invited_by: None,
                created_at: chrono::Utc::now(),
            })
            .await?;
        tracing::info!(email = %email, "admin whitelisted from configuration");
    }
    Ok(())
}

fn auth_provider(config: &StoreConfig) -> Arc<dyn AuthProvider> {
    #[cfg(feature = "supabase-auth")]
    if let (Some(url), Some(key)) = (&config.auth.supabase_url, &config.auth.supabase_anon_key) {
        tracing::info!("using hosted identity provider");
        return Arc::new(SupabaseAuthProvider::new(url.clone(), key.clone()));
    }

    if config.auth.static_tokens.is_empty() {
        tracing::warn!("no identity provider configured, admin routes are unreachable");
    }
    Arc::new(StaticTokenAuthProvider::new(config.auth.static_tokens.clone()))
}

fn mailer(config: &StoreConfig) -> Result<Arc<dyn Mailer>> {
    #[cfg(feature = "email")]
    if let Some(key) = &config.notifications.resend_api_key {
        let mailer = ResendMailer::new(config.notifications.resend_api_base.clone(), key.clone())?;
        return Ok(Arc::new(mailer));
    }

    if config.notifications.enabled {
        tracing::info!("no email provider configured, emails are only logged");
    }
    Ok(Arc::new(LogMailer))
}
