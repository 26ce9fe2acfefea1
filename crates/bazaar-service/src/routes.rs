//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    accounts, admin, cart, catalog, checkout, deposits, health, orders, reminders, saved,
};
use crate::state::AppState;

/// Maximum in-flight requests across the API.
const API_MAX_CONCURRENT_REQUESTS: usize = 1000;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/categories` - List categories
/// - `GET /v1/products/:id` - Product detail (records the view when a session is known)
/// - `GET /v1/recently-viewed` - Products viewed in this session
///
/// ## Accounts (bearer token)
/// - `POST /v1/accounts` - Create account
/// - `GET /v1/accounts/me` - Get current user's account
/// - `PATCH /v1/accounts/me` - Update username and contacts
/// - `GET /v1/profiles/:username` - Another user's public profile
/// - `GET /v1/balance` - Get current balance
/// - `GET /v1/balance/entries` - List balance history
/// - `POST /v1/reminders`, `GET /v1/reminders` - Own calendar reminders
///
/// ## Catalog (bearer token)
/// - `POST /v1/products` - List a product
/// - `PATCH /v1/products/:id`, `DELETE /v1/products/:id` - Author only
/// - `POST /v1/products/:id/comments` - Comment
/// - `DELETE /v1/products/:id/comments/:comment_id` - Comment author only
/// - `POST /v1/saved/:product_id`, `GET /v1/saved` - Saved products
///
/// ## Cart and checkout (bearer token, `x-session-id`)
/// - `GET /v1/cart`, `POST /v1/cart/items`, `DELETE /v1/cart/items/:product_id`
/// - `POST /v1/cart/clear`
/// - `POST /v1/cart/promo`, `DELETE /v1/cart/promo`
/// - `POST /v1/cart/checkout` - Buy the cart
/// - `POST /v1/products/:id/buy` - Buy one product now
///
/// ## Deposits and orders (bearer token)
/// - `POST /v1/deposits`, `GET /v1/deposits`
/// - `GET /v1/orders`, `DELETE /v1/orders/:id`, `POST /v1/orders/clear`
///
/// ## Admin (`x-api-key`)
/// - `POST /v1/admin/categories`
/// - `POST /v1/admin/promo-codes`, `POST /v1/admin/promo-codes/:code/deactivate`
/// - `GET /v1/admin/deposits/pending`, `POST /v1/admin/deposits/:id/confirm`
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Accounts
        .route("/v1/accounts", post(accounts::create_account))
        .route(
            "/v1/accounts/me",
            get(accounts::get_account).patch(accounts::update_profile),
        )
        .route("/v1/profiles/:username", get(accounts::get_profile))
        .route("/v1/balance", get(accounts::get_balance))
        .route("/v1/balance/entries", get(accounts::list_entries))
        .route(
            "/v1/reminders",
            post(reminders::create_reminder).get(reminders::list_reminders),
        )
        // Catalog
        .route("/v1/categories", get(catalog::list_categories))
        .route("/v1/products", post(catalog::create_product))
        .route(
            "/v1/products/:id",
            get(catalog::get_product)
                .patch(catalog::update_product)
                .delete(catalog::delete_product),
        )
        .route("/v1/products/:id/comments", post(catalog::add_comment))
        .route(
            "/v1/products/:id/comments/:comment_id",
            delete(catalog::delete_comment),
        )
        .route("/v1/products/:id/buy", post(checkout::buy_now))
        // Saved and recently viewed
        .route("/v1/saved", get(saved::list_saved))
        .route("/v1/saved/:product_id", post(saved::toggle_saved))
        .route("/v1/recently-viewed", get(saved::list_recently_viewed))
        // Cart
        .route("/v1/cart", get(cart::view_cart))
        .route("/v1/cart/items", post(cart::add_item))
        .route("/v1/cart/items/:product_id", delete(cart::remove_item))
        .route("/v1/cart/clear", post(cart::clear_cart))
        .route(
            "/v1/cart/promo",
            post(cart::apply_promo).delete(cart::clear_promo),
        )
        .route("/v1/cart/checkout", post(checkout::checkout_cart))
        // Deposits
        .route(
            "/v1/deposits",
            post(deposits::request_deposit).get(deposits::list_deposits),
        )
        // Orders
        .route("/v1/orders", get(orders::list_orders))
        .route("/v1/orders/clear", post(orders::clear_orders))
        .route("/v1/orders/:id", delete(orders::delete_order))
        // Admin
        .route("/v1/admin/categories", post(admin::create_category))
        .route("/v1/admin/promo-codes", post(admin::create_promo_code))
        .route(
            "/v1/admin/promo-codes/:code/deactivate",
            post(admin::deactivate_promo_code),
        )
        .route(
            "/v1/admin/deposits/pending",
            get(admin::list_pending_deposits),
        )
        .route(
            "/v1/admin/deposits/:id/confirm",
            post(admin::confirm_deposit),
        )
        // Middleware
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
