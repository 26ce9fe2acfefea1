//! Bazaar Service - HTTP API for the marketplace
//!
//! Exposes the catalog, session carts, checkout, deposits and order history
//! over JSON, on top of any [`bazaar_store::Store`] backend.
//!
//! Users authenticate with a bearer token; operators use an API key on the
//! `/v1/admin` routes. Carts and promo codes live in a browser session named
//! by the `x-session-id` header.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;

pub use config::{ConfigError, ServiceConfig, StorageBackend};
pub use error::ApiError;
pub use routes::create_router;
pub use state::{open_store, AppState};
