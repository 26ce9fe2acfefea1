//! Core types and business rules for the bazaar marketplace.
//!
//! This crate has no I/O. It provides:
//!
//! - **Identifiers**: `UserId`, `ProductId`, `OrderId`, `SessionId`, ...
//! - **Accounts**: `Account`, `NewAccount`, `ProfileUpdate`, `Reminder`
//! - **Catalog**: `Category`, `Product`, `Comment`, `SavedProduct`
//! - **Sessions**: `Session`, `Cart`
//! - **Promo codes**: `PromoCode`, `DiscountPercent`
//! - **Checkout**: `price_lines`, `plan_checkout`
//! - **Money movement**: `Deposit`, `Order`, `LedgerEntry`
//!
//! # Money
//!
//! All amounts are `i64` cents. Decimal input is rounded half-up to two
//! places once, at the boundary, by [`money::cents_from_decimal`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod catalog;
pub mod checkout;
pub mod deposit;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod order;
pub mod pricing;
pub mod promo;
pub mod reminder;
pub mod session;

pub use account::{username_key, Account, NewAccount, ProfileUpdate};
pub use catalog::{
    average_rating, Category, Comment, NewProduct, Product, ProductUpdate, SavedProduct,
};
pub use checkout::{plan_checkout, CheckoutPlan, CheckoutReceipt, CheckoutRequest, LineRequest};
pub use deposit::Deposit;
pub use error::{MarketError, Result};
pub use ids::{
    CategoryId, CommentId, DepositId, IdError, LedgerEntryId, OrderId, ProductId, ReminderId,
    SessionId, UserId,
};
pub use ledger::{EntryKind, LedgerEntry};
pub use order::Order;
pub use pricing::{price_lines, Quote, QuotedLine};
pub use promo::{normalize_code, AppliedPromo, DiscountPercent, PromoCode};
pub use reminder::{sort_reminders, Reminder};
pub use session::{Cart, Session, MAX_LINE_QUANTITY};
