//! API handlers.

use serde::Deserialize;

use bazaar_core::UserId;
use bazaar_store::Store;

use crate::error::ApiError;

pub mod accounts;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod deposits;
pub mod health;
pub mod orders;
pub mod reminders;
pub mod saved;

/// Largest page a list endpoint returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl PageQuery {
    /// The effective limit, capped at [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.min(MAX_PAGE_SIZE)
    }
}

/// Title search query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive substring of the product title.
    #[serde(default)]
    pub q: Option<String>,
}

/// Fail with 404 unless the user has an account.
pub(crate) async fn require_account(store: &dyn Store, user_id: &UserId) -> Result<(), ApiError> {
    store
        .get_account(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))
}
