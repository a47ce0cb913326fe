//! Missive notification service binary entrypoint.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use missive_common::config::{AppConfig, LogFormat};
use missive_common::redis_pool::create_redis_pool;
use missive_common::types::Channel;
use missive_notifier::dispatch::DispatchRegistry;
use missive_notifier::queue::RedisQueue;
use missive_notifier::service::{DefaultProviders, NotificationService};
use missive_notifier::worker::WorkerPool;

use missive_api::routes::create_router;
use missive_api::state::AppState;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;

    init_tracing(config.log_format);
    tracing::info!("Starting Missive notification service...");

    // Create Redis connection
    let redis = create_redis_pool(
        &config.redis_url,
        config.redis_password.as_deref(),
        config.redis_db,
        &config.redis_timeouts,
    )
    .await?;
    let store = Arc::new(RedisQueue::new(redis, config.corrupt_entry_policy));

    // Build dispatch registry and service
    let registry = DispatchRegistry::with_builtin(config.providers.clone())?;
    let defaults = DefaultProviders::from_config(&config);
    if !registry.is_registered(Channel::Email, &config.default_email_provider) {
        tracing::warn!(
            provider = %config.default_email_provider,
            available = ?registry.providers(Channel::Email),
            "Default email provider is not registered; email dispatch will be rejected"
        );
    }
    let service = Arc::new(NotificationService::new(store, registry, defaults));

    // Start workers
    let mut pool = WorkerPool::spawn(service.clone(), &config.workers);

    // Build router
    let state = AppState::new(service);
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("API server listening on {}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("Draining worker pool...");
    pool.shutdown(config.workers.drain_timeout).await;

    served?;
    tracing::info!("Missive notification service stopped.");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("missive_api=debug,missive_notifier=debug,tower_http=debug")
    });

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal, stopping gracefully...");
}
