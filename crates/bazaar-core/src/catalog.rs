//! Catalog types: categories, product listings, comments and saved products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::check_len;
use crate::error::{MarketError, Result};
use crate::money::MAX_AMOUNT_CENTS;
use crate::{CategoryId, CommentId, ProductId, UserId};

/// Maximum category name length.
pub const MAX_CATEGORY_NAME_LEN: usize = 20;
/// Maximum product title length.
pub const MAX_TITLE_LEN: usize = 150;
/// Maximum address length.
pub const MAX_ADDRESS_LEN: usize = 150;
/// Maximum phone number length on a listing.
pub const MAX_PHONE_LEN: usize = 17;
/// Maximum Telegram username length on a listing.
pub const MAX_TG_USERNAME_LEN: usize = 100;
/// Maximum comment body length.
pub const MAX_COMMENT_LEN: usize = 150;
/// Highest comment rating. A rating of 0 means "not rated".
pub const MAX_RATING: u8 = 5;

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category ID.
    pub id: CategoryId,
    /// Display name, unique case-insensitively.
    pub name: String,
}

impl Category {
    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or over-long name.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::invalid("category name is required"));
        }
        check_len("name", name, MAX_CATEGORY_NAME_LEN)?;
        Ok(Self {
            id: CategoryId::generate(),
            name: name.to_string(),
        })
    }

    /// Lookup key for the uniqueness check.
    #[must_use]
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// A product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// The seller.
    pub author_id: UserId,
    /// Category the product is listed under.
    pub category_id: CategoryId,
    /// Listing title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Unit price in cents.
    pub price_cents: i64,
    /// Pickup address.
    pub address: String,
    /// Seller contact phone.
    pub phone_number: String,
    /// Seller Telegram handle.
    pub tg_username: String,
    /// Units in stock. Only checkout decrements it.
    pub count: u32,
    /// When the listing was created.
    pub created_at: DateTime<Utc>,
    /// When the listing was last changed.
    pub updated_at: DateTime<Utc>,
}

fn default_count() -> u32 {
    1
}

/// Fields for a new listing.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    /// Category the product is listed under.
    pub category_id: CategoryId,
    /// Listing title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Unit price in cents.
    pub price_cents: i64,
    /// Pickup address.
    #[serde(default)]
    pub address: String,
    /// Seller contact phone.
    #[serde(default)]
    pub phone_number: String,
    /// Seller Telegram handle.
    #[serde(default)]
    pub tg_username: String,
    /// Units in stock.
    #[serde(default = "default_count")]
    pub count: u32,
}

/// A partial update to a listing. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    /// New category.
    pub category_id: Option<CategoryId>,
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New unit price in cents.
    pub price_cents: Option<i64>,
    /// New address.
    pub address: Option<String>,
    /// New phone number.
    pub phone_number: Option<String>,
    /// New Telegram handle.
    pub tg_username: Option<String>,
    /// New stock level.
    pub count: Option<u32>,
}

impl Product {
    /// Create a listing owned by `author_id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when a field fails validation.
    pub fn new(author_id: UserId, fields: NewProduct) -> Result<Self> {
        let now = Utc::now();
        let product = Self {
            id: ProductId::generate(),
            author_id,
            category_id: fields.category_id,
            title: fields.title.trim().to_string(),
            description: fields.description,
            price_cents: fields.price_cents,
            address: fields.address.trim().to_string(),
            phone_number: fields.phone_number.trim().to_string(),
            tg_username: fields.tg_username.trim().to_string(),
            count: fields.count,
            created_at: now,
            updated_at: now,
        };
        product.validate()?;
        Ok(product)
    }

    /// Whether `user_id` owns this listing.
    #[must_use]
    pub fn is_authored_by(&self, user_id: &UserId) -> bool {
        self.author_id == *user_id
    }

    /// Apply a partial update on behalf of `editor`.
    ///
    /// The update is validated as a whole; on error the product is unchanged.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if `editor` is not the author.
    /// - `InvalidInput` if the updated listing fails validation.
    pub fn apply_update(&mut self, editor: &UserId, update: &ProductUpdate) -> Result<()> {
        if !self.is_authored_by(editor) {
            return Err(MarketError::Forbidden(
                "only the author can edit this product".into(),
            ));
        }

        let mut next = self.clone();
        if let Some(category_id) = update.category_id {
            next.category_id = category_id;
        }
        if let Some(title) = &update.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = &update.description {
            next.description.clone_from(description);
        }
        if let Some(price_cents) = update.price_cents {
            next.price_cents = price_cents;
        }
        if let Some(address) = &update.address {
            next.address = address.trim().to_string();
        }
        if let Some(phone_number) = &update.phone_number {
            next.phone_number = phone_number.trim().to_string();
        }
        if let Some(tg_username) = &update.tg_username {
            next.tg_username = tg_username.trim().to_string();
        }
        if let Some(count) = update.count {
            next.count = count;
        }
        next.validate()?;
        next.updated_at = Utc::now();

        *self = next;
        Ok(())
    }

    /// Check that `user_id` may delete this listing.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if `user_id` is not the author.
    pub fn check_delete(&self, user_id: &UserId) -> Result<()> {
        if self.is_authored_by(user_id) {
            Ok(())
        } else {
            Err(MarketError::Forbidden(
                "only the author can delete this product".into(),
            ))
        }
    }

    /// Case-insensitive title match used by saved and recently-viewed filters.
    #[must_use]
    pub fn title_contains(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(&query.to_lowercase())
    }

    fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(MarketError::invalid("title is required"));
        }
        check_len("title", &self.title, MAX_TITLE_LEN)?;
        check_len("address", &self.address, MAX_ADDRESS_LEN)?;
        check_len("phone_number", &self.phone_number, MAX_PHONE_LEN)?;
        check_len("tg_username", &self.tg_username, MAX_TG_USERNAME_LEN)?;
        if !(0..=MAX_AMOUNT_CENTS).contains(&self.price_cents) {
            return Err(MarketError::invalid(
                "price must be between 0 and 99999999.99",
            ));
        }
        Ok(())
    }
}

/// A buyer's comment on a product, optionally with a rating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment ID.
    pub id: CommentId,
    /// The product commented on.
    pub product_id: ProductId,
    /// Who wrote the comment.
    pub author_id: UserId,
    /// Comment text.
    pub body: String,
    /// Rating from 1 to 5, or 0 when the comment carries no rating.
    pub rating: u8,
    /// When the comment was written.
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Create a comment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty or over-long body or a rating above 5.
    pub fn new(product_id: ProductId, author_id: UserId, body: &str, rating: u8) -> Result<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Err(MarketError::invalid("comment body is required"));
        }
        check_len("body", body, MAX_COMMENT_LEN)?;
        if rating > MAX_RATING {
            return Err(MarketError::invalid(format!(
                "rating must be between 0 and {MAX_RATING}"
            )));
        }
        Ok(Self {
            id: CommentId::generate(),
            product_id,
            author_id,
            body: body.to_string(),
            rating,
            created_at: Utc::now(),
        })
    }

    /// Check that `user_id` may delete this comment.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if `user_id` did not write the comment.
    pub fn check_delete(&self, user_id: &UserId) -> Result<()> {
        if self.author_id == *user_id {
            Ok(())
        } else {
            Err(MarketError::Forbidden(
                "only the author can delete this comment".into(),
            ))
        }
    }
}

/// Mean of all non-zero ratings, or 0 if nothing has been rated.
#[must_use]
pub fn average_rating(comments: &[Comment]) -> f64 {
    let rated: Vec<u8> = comments
        .iter()
        .map(|c| c.rating)
        .filter(|r| *r > 0)
        .collect();
    if rated.is_empty() {
        return 0.0;
    }
    let sum: u32 = rated.iter().map(|r| u32::from(*r)).sum();
    f64::from(sum) / f64::from(u32::try_from(rated.len()).unwrap_or(u32::MAX))
}

/// A product bookmarked by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedProduct {
    /// Who saved it.
    pub user_id: UserId,
    /// What was saved.
    pub product_id: ProductId,
    /// When it was saved.
    pub saved_at: DateTime<Utc>,
}

impl SavedProduct {
    /// Record `product_id` as saved by `user_id` now.
    #[must_use]
    pub fn new(user_id: UserId, product_id: ProductId) -> Self {
        Self {
            user_id,
            product_id,
            saved_at: Utc::now(),
        }
    }
}
