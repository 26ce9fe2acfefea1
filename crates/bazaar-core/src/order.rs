//! Order history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::{OrderId, ProductId, UserId};

/// A completed purchase line.
///
/// Orders are immutable. The owning user may delete them from their history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID (ULID, so newer orders sort after older ones).
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Purchased product.
    pub product_id: ProductId,
    /// Product title when the order was placed.
    pub product_title: String,
    /// Amount charged for the line, discount included, in cents.
    pub price_cents: i64,
    /// Units bought.
    pub quantity: u32,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Check that `user_id` may delete this order.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for another user's order.
    pub fn check_owner(&self, user_id: &UserId) -> Result<()> {
        if self.user_id == *user_id {
            Ok(())
        } else {
            Err(MarketError::Forbidden(
                "order belongs to another user".into(),
            ))
        }
    }
}
