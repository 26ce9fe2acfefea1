//! Storage layer for bazaar.
//!
//! The [`Store`] trait is everything the service needs from persistence. Three
//! backends implement it:
//!
//! - [`MemoryStore`]: in-process tables behind one lock. Used by tests and local runs.
//! - `RocksStore` (feature `rocksdb-backend`): column families with CBOR values.
//! - [`PgStore`]: `PostgreSQL` through `sqlx`, with row locks for checkout.
//!
//! # Atomicity
//!
//! Operations that read, validate and write several records
//! ([`Store::commit_checkout`], [`Store::confirm_deposit`],
//! [`Store::update_product`]) run the validation while holding the backend's
//! lock or row locks, and write everything in one batch or transaction. When
//! they fail nothing is written.
//!
//! # Example
//!
//! ```no_run
//! use bazaar_core::{Account, NewAccount, UserId};
//! use bazaar_store::{MemoryStore, Store};
//!
//! # async fn demo() -> bazaar_store::Result<()> {
//! let store = MemoryStore::new();
//!
//! let account = Account::new(UserId::generate(), NewAccount::default())?;
//! store.create_account(&account).await?;
//!
//! let retrieved = store.get_account(&account.user_id).await?;
//! assert!(retrieved.is_some());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod memory;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use serde::Serialize;

use chrono::{DateTime, Utc};

use bazaar_core::{
    Account, Category, CategoryId, CheckoutReceipt, CheckoutRequest, Comment, CommentId, Deposit,
    DepositId, LedgerEntry, Order, OrderId, Product, ProductId, ProductUpdate, ProfileUpdate,
    PromoCode, Reminder, Session, SessionId, UserId,
};

/// Result of confirming a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositConfirmation {
    /// The deposit after confirmation.
    pub deposit: Deposit,
    /// Whether this call credited the balance. False if it was already confirmed.
    pub credited: bool,
    /// The owner's balance after the call.
    pub balance_after_cents: i64,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (in-memory, `RocksDB`, `PostgreSQL`). Business-rule failures are reported as
/// [`StoreError::Rejected`].
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns a `Conflict` rejection if the user already has an account or the
    /// username is taken (case-insensitively).
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Find an account by username, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>>;

    /// Change an account's profile fields. The balance is never touched.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection without an account, `InvalidInput` for bad
    /// fields, or `Conflict` if the new username is taken.
    async fn update_profile(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<Account>;

    /// List balance ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Insert a category.
    ///
    /// # Errors
    ///
    /// Returns a `Conflict` rejection if the name is taken (case-insensitively).
    async fn create_category(&self, category: &Category) -> Result<()>;

    /// Get a category by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_category(&self, category_id: &CategoryId) -> Result<Option<Category>>;

    /// List all categories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection if its category does not exist.
    async fn create_product(&self, product: &Product) -> Result<()>;

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Get the products that exist among `product_ids`, in the given order.
    ///
    /// Missing products are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Apply a partial update as `editor`, atomically with respect to checkout.
    ///
    /// Returns the updated product.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the product or the new category does not exist.
    /// - `Forbidden` if `editor` is not the author.
    /// - `InvalidInput` if the result would be an invalid listing.
    async fn update_product(
        &self,
        product_id: &ProductId,
        editor: &UserId,
        update: &ProductUpdate,
    ) -> Result<Product>;

    /// Delete a product as `requester`, together with its comments and saves.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the product does not exist.
    /// - `Forbidden` if `requester` is not the author.
    async fn delete_product(&self, product_id: &ProductId, requester: &UserId) -> Result<()>;

    // =========================================================================
    // Comment Operations
    // =========================================================================

    /// Insert a comment.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection if the product does not exist.
    async fn add_comment(&self, comment: &Comment) -> Result<()>;

    /// List comments on a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_comments(&self, product_id: &ProductId) -> Result<Vec<Comment>>;

    /// Delete a comment as `requester`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the comment does not exist on that product.
    /// - `Forbidden` if `requester` did not write it.
    async fn delete_comment(
        &self,
        product_id: &ProductId,
        comment_id: &CommentId,
        requester: &UserId,
    ) -> Result<()>;

    // =========================================================================
    // Saved Product Operations
    // =========================================================================

    /// Save the product if it is not saved, unsave it otherwise.
    ///
    /// Returns whether the product is saved afterwards.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection if the product does not exist.
    async fn toggle_saved(&self, user_id: &UserId, product_id: &ProductId) -> Result<bool>;

    /// List the user's saved products, most recently saved first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_saved(&self, user_id: &UserId) -> Result<Vec<Product>>;

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// Insert or replace a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_session(&self, session: &Session) -> Result<()>;

    /// Delete sessions last written before `cutoff`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn prune_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // =========================================================================
    // Reminder Operations
    // =========================================================================

    /// Insert a reminder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create_reminder(&self, reminder: &Reminder) -> Result<()>;

    /// List a user's reminders by day, then by creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_reminders(&self, user_id: &UserId) -> Result<Vec<Reminder>>;

    // =========================================================================
    // Promo Code Operations
    // =========================================================================

    /// Insert a promo code.
    ///
    /// # Errors
    ///
    /// Returns a `Conflict` rejection if the code exists (case-insensitively).
    async fn create_promo_code(&self, promo: &PromoCode) -> Result<()>;

    /// Find a promo code, matching case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_promo_code(&self, code: &str) -> Result<Option<PromoCode>>;

    /// Set a promo code's active flag. Returns the updated code.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection if the code does not exist.
    async fn set_promo_code_active(&self, code: &str, is_active: bool) -> Result<PromoCode>;

    // =========================================================================
    // Deposit Operations
    // =========================================================================

    /// Insert an unconfirmed deposit request.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection if the user has no account.
    async fn create_deposit(&self, deposit: &Deposit) -> Result<()>;

    /// List a user's deposits, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_deposits(&self, user_id: &UserId) -> Result<Vec<Deposit>>;

    /// List unconfirmed deposits, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_pending_deposits(&self) -> Result<Vec<Deposit>>;

    /// Confirm a deposit and credit its owner exactly once.
    ///
    /// The confirmation flag, the balance credit and the ledger entry are
    /// written together. Confirming an already confirmed deposit changes nothing.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` rejection if the deposit or the owner's account does not exist.
    async fn confirm_deposit(&self, deposit_id: &DepositId) -> Result<DepositConfirmation>;

    // =========================================================================
    // Order Operations
    // =========================================================================

    /// List a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_orders(&self, user_id: &UserId, limit: usize, offset: usize)
        -> Result<Vec<Order>>;

    /// Delete one of the user's orders.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the order does not exist.
    /// - `Forbidden` if it belongs to another user; nothing is removed.
    async fn delete_order(&self, user_id: &UserId, order_id: &OrderId) -> Result<()>;

    /// Delete all of the user's orders. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn clear_orders(&self, user_id: &UserId) -> Result<usize>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Validate and commit a checkout atomically.
    ///
    /// Under lock: loads the buyer's account and every requested product, runs
    /// [`bazaar_core::plan_checkout`], then writes the debited account, the
    /// decremented stock, the orders, the ledger entry and `session_after`
    /// together.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account or a product does not exist.
    /// - `InsufficientStock` / `InsufficientFunds` from validation.
    ///
    /// On any error nothing is written, including the session.
    async fn commit_checkout(
        &self,
        request: &CheckoutRequest,
        session_after: &Session,
    ) -> Result<CheckoutReceipt>;
}

/// Apply a limit/offset window to an already ordered list.
pub(crate) fn page<T>(items: impl IntoIterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
