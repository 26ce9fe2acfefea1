//! Bazaar Service - HTTP API for the marketplace
//!
//! This is the main entry point for the bazaar service.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_service::session::spawn_session_pruner;
use bazaar_service::{create_router, open_store, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bazaar=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Bazaar Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        storage_backend = ?config.storage_backend,
        data_dir = %config.data_dir,
        jwt_configured = %config.jwt_secret.is_some(),
        allow_test_tokens = %config.allow_test_tokens,
        admin_configured = %config.admin_api_key.is_some(),
        session_ttl_hours = config.session_ttl_hours,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;

    spawn_session_pruner(
        store.clone(),
        config.session_ttl_hours,
        config.session_prune_interval_seconds,
    );

    // Build app state
    let state = AppState::new(store, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
