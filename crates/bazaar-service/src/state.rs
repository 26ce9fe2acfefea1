//! Application state.

use std::sync::Arc;

use bazaar_store::{MemoryStore, PgStore, Store};

use crate::config::{ConfigError, ServiceConfig, StorageBackend};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        if config.jwt_secret.is_none() {
            tracing::warn!("JWT_SECRET not configured - only test tokens can authenticate");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not configured - admin routes are disabled");
        }

        Self { store, config }
    }
}

/// Open the store selected by `config.storage_backend`.
///
/// # Errors
///
/// Returns an error if the backend is misconfigured, not compiled in, or fails to open.
pub async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, ConfigError> {
    match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store - state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::RocksDb => open_rocks(&config.data_dir),
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "Connecting to PostgreSQL"
            );
            let store = PgStore::connect(url, config.database_max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocks(data_dir: &str) -> Result<Arc<dyn Store>, ConfigError> {
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    Ok(Arc::new(bazaar_store::RocksStore::open(data_dir)?))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocks(_data_dir: &str) -> Result<Arc<dyn Store>, ConfigError> {
    Err(ConfigError::BackendUnavailable("rocksdb"))
}
