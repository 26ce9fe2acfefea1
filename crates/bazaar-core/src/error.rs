//! Error types for bazaar.

use crate::ids::IdError;

/// Result type for bazaar domain operations.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Business-rule rejections raised by the marketplace domain.
///
/// None of these are fatal: every variant is surfaced to the caller and all
/// persisted state is left as it was before the rejected operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (`product`, `order`, ...).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A checkout line asks for more units than are in stock.
    #[error("insufficient stock for {title}: available={available}, requested={requested}")]
    InsufficientStock {
        /// The product that cannot be fulfilled.
        product_id: String,
        /// Product title, for the user-facing message.
        title: String,
        /// Units currently in stock.
        available: u32,
        /// Units requested.
        requested: u32,
    },

    /// The user's balance does not cover the checkout total.
    #[error("insufficient funds: balance={balance_cents}, required={required_cents}")]
    InsufficientFunds {
        /// Current balance in cents.
        balance_cents: i64,
        /// Total required in cents.
        required_cents: i64,
    },

    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown, inactive or expired promo code.
    #[error("invalid or inactive promo code: {code}")]
    InvalidPromoCode {
        /// The code as submitted.
        code: String,
    },

    /// Acting on a resource owned by another user.
    #[error("not permitted: {0}")]
    Forbidden(String),

    /// Creating a record that already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl MarketError {
    /// Shorthand for [`MarketError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`MarketError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
