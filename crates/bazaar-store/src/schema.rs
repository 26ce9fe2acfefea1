//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Categories, keyed by `category_id`.
    pub const CATEGORIES: &str = "categories";

    /// Products, keyed by `product_id`.
    pub const PRODUCTS: &str = "products";

    /// Comments, keyed by `comment_id`.
    pub const COMMENTS: &str = "comments";

    /// Index: comments by product, keyed by `product_id || comment_id`.
    /// Value is empty (index only).
    pub const COMMENTS_BY_PRODUCT: &str = "comments_by_product";

    /// Saved products, keyed by `user_id || product_id`.
    pub const SAVED: &str = "saved";

    /// Browser sessions, keyed by the session id string.
    pub const SESSIONS: &str = "sessions";

    /// Promo codes, keyed by the lowercased code.
    pub const PROMO_CODES: &str = "promo_codes";

    /// Deposit requests, keyed by `deposit_id` (ULID).
    pub const DEPOSITS: &str = "deposits";

    /// Index: deposits by user, keyed by `user_id || deposit_id`.
    pub const DEPOSITS_BY_USER: &str = "deposits_by_user";

    /// Orders, keyed by `order_id` (ULID).
    pub const ORDERS: &str = "orders";

    /// Index: orders by user, keyed by `user_id || order_id`.
    pub const ORDERS_BY_USER: &str = "orders_by_user";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Reminders, keyed by `reminder_id` (ULID).
    pub const REMINDERS: &str = "reminders";

    /// Index: reminders by user, keyed by `user_id || reminder_id`.
    pub const REMINDERS_BY_USER: &str = "reminders_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::CATEGORIES,
        cf::PRODUCTS,
        cf::COMMENTS,
        cf::COMMENTS_BY_PRODUCT,
        cf::SAVED,
        cf::SESSIONS,
        cf::PROMO_CODES,
        cf::DEPOSITS,
        cf::DEPOSITS_BY_USER,
        cf::ORDERS,
        cf::ORDERS_BY_USER,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
        cf::REMINDERS,
        cf::REMINDERS_BY_USER,
    ]
}
