//! Error types for bazaar storage.

use bazaar_core::MarketError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored value could not be turned back into a domain record.
    #[error("corrupt record in {table}: {reason}")]
    Corrupt {
        /// Table or column family holding the record.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The operation was rejected by a business rule.
    ///
    /// Nothing was written.
    #[error(transparent)]
    Rejected(#[from] MarketError),
}

impl StoreError {
    /// Shorthand for a `NotFound` rejection.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::Rejected(MarketError::not_found(entity, id))
    }

    /// Shorthand for a `Conflict` rejection.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Rejected(MarketError::Conflict(message.into()))
    }

    /// The domain rejection, if this is one.
    #[must_use]
    pub fn as_rejection(&self) -> Option<&MarketError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Database(e.to_string())
    }
}
