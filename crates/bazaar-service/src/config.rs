//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// Which [`bazaar_store::Store`] implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process tables; state is lost on restart.
    Memory,
    /// Embedded `RocksDB` under `data_dir`.
    RocksDb,
    /// `PostgreSQL` at `database_url`.
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" => Ok(Self::RocksDb),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Errors raised while loading configuration or opening storage.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `STORAGE_BACKEND` names no known backend.
    #[error("unknown storage backend: {0}")]
    UnknownBackend(String),

    /// The selected backend needs `DATABASE_URL`.
    #[error("DATABASE_URL is required for the postgres backend")]
    MissingDatabaseUrl,

    /// The selected backend was not compiled into this binary.
    #[error("storage backend not compiled in: {0}")]
    BackendUnavailable(&'static str),

    /// Opening the store failed.
    #[error(transparent)]
    Store(#[from] bazaar_store::StoreError),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: memory).
    pub storage_backend: StorageBackend,

    /// Path to `RocksDB` data directory (default: "/data/bazaar").
    pub data_dir: String,

    /// `PostgreSQL` connection URL.
    pub database_url: Option<String>,

    /// `PostgreSQL` pool size.
    pub database_max_connections: u32,

    /// HS256 secret for user tokens.
    pub jwt_secret: Option<String>,

    /// Expected JWT audience (default: "bazaar").
    pub auth_audience: String,

    /// Accept `Bearer test-token:<uuid>`. Never enable in production.
    pub allow_test_tokens: bool,

    /// Key expected in `x-api-key` on admin routes.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Sessions idle for longer than this are deleted (default: 30 days).
    pub session_ttl_hours: u64,

    /// How often idle sessions are swept (default: hourly).
    pub session_prune_interval_seconds: u64,
}

/// Secrets file structure.
#[derive(Debug, Default, Deserialize)]
struct Secrets {
    #[serde(default)]
    jwt_secret: Option<String>,
    #[serde(default)]
    admin_api_key: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and the secrets file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBackend`] for an unrecognised `STORAGE_BACKEND`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secrets = load_secrets();

        let storage_backend = match std::env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Memory,
        };

        Ok(Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            storage_backend,
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/bazaar".into()),
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            jwt_secret: std::env::var("JWT_SECRET").ok().or(secrets.jwt_secret),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or_else(|_| "bazaar".into()),
            allow_test_tokens: parse_env("ALLOW_TEST_TOKENS").unwrap_or(false),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok().or(secrets.admin_api_key),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parse_env("MAX_BODY_BYTES").unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: parse_env("REQUEST_TIMEOUT_SECONDS").unwrap_or(30),
            session_ttl_hours: parse_env("SESSION_TTL_HOURS").unwrap_or(720),
            session_prune_interval_seconds: parse_env("SESSION_PRUNE_INTERVAL_SECONDS")
                .unwrap_or(3600),
        })
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Load secrets from the first secrets file found.
fn load_secrets() -> Secrets {
    let secret_paths = [
        ".secrets/bazaar.json",
        "bazaar/.secrets/bazaar.json",
        "crates/bazaar-service/.secrets/bazaar.json",
        "../.secrets/bazaar.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<Secrets>(Path::new(path)) {
            tracing::info!(path = %path, "Loaded secrets from file");
            return secrets;
        }
    }

    tracing::debug!("Secrets file not found, using environment variables");
    Secrets::default()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, std::io::Error> {
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            storage_backend: StorageBackend::Memory,
            data_dir: "/data/bazaar".into(),
            database_url: None,
            database_max_connections: 10,
            jwt_secret: None,
            auth_audience: "bazaar".into(),
            allow_test_tokens: false,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            session_ttl_hours: 720,
            session_prune_interval_seconds: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("RocksDB".parse::<StorageBackend>().unwrap(), StorageBackend::RocksDb);
        assert_eq!("postgresql".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert!(matches!(
            "sqlite".parse::<StorageBackend>(),
            Err(ConfigError::UnknownBackend(name)) if name == "sqlite"
        ));
    }

    #[test]
    fn sessions_expire_after_thirty_days_by_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.session_ttl_hours, 30 * 24);
        assert_eq!(config.session_prune_interval_seconds, 3600);
    }

    #[test]
    fn secrets_file_fields_are_optional() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bazaar.json");
        std::fs::write(&path, r#"{"admin_api_key": "k"}"#).unwrap();

        let secrets: Secrets = load_secrets_file(&path).unwrap();
        assert_eq!(secrets.admin_api_key.as_deref(), Some("k"));
        assert!(secrets.jwt_secret.is_none());
    }

    #[test]
    fn missing_secrets_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_secrets_file::<Secrets>(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
