//! Checkout handlers.
//!
//! Both entry points build a [`CheckoutRequest`] from the session and hand it
//! to [`bazaar_store::Store::commit_checkout`], which validates and writes
//! everything in one step. A rejected checkout leaves the session untouched,
//! including its promo code.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use bazaar_core::money::format_cents;
use bazaar_core::{CheckoutReceipt, CheckoutRequest, Order, ProductId, Session};

use super::cart::default_quantity;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::session::{load_session, SessionHeader};
use crate::state::AppState;

/// Order response.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    /// Order ID.
    pub id: String,
    /// Purchased product. It may have been deleted since.
    pub product_id: String,
    /// Product title at purchase time.
    pub product_title: String,
    /// Amount charged for the line in cents.
    pub price_cents: i64,
    /// Amount charged formatted as a decimal.
    pub price_formatted: String,
    /// Units bought.
    pub quantity: u32,
    /// Purchase timestamp.
    pub created_at: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            product_id: order.product_id.to_string(),
            product_title: order.product_title.clone(),
            price_cents: order.price_cents,
            price_formatted: format_cents(order.price_cents),
            quantity: order.quantity,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// Checkout response.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// One order per line.
    pub orders: Vec<OrderResponse>,
    /// Total before discount.
    pub base_total_cents: i64,
    /// Discount applied, if any.
    pub discount_percentage: Option<u8>,
    /// Amount taken off.
    pub discount_cents: i64,
    /// Amount debited.
    pub total_cents: i64,
    /// Amount debited formatted as a decimal.
    pub total_formatted: String,
    /// Balance after the purchase.
    pub balance_cents: i64,
    /// Balance formatted as a decimal.
    pub balance_formatted: String,
}

impl From<&CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: &CheckoutReceipt) -> Self {
        Self {
            orders: receipt.orders.iter().map(OrderResponse::from).collect(),
            base_total_cents: receipt.quote.base_total_cents,
            discount_percentage: receipt.quote.discount.map(|d| d.get()),
            discount_cents: receipt.quote.discount_cents,
            total_cents: receipt.quote.total_cents,
            total_formatted: format_cents(receipt.quote.total_cents),
            balance_cents: receipt.balance_after_cents,
            balance_formatted: format_cents(receipt.balance_after_cents),
        }
    }
}

/// Buy everything in the cart.
///
/// On success the cart is emptied and the promo code is consumed.
pub async fn checkout_cart(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let session = load_session(
        state.store.as_ref(),
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;
    let request = CheckoutRequest::from_cart(auth.user_id, &session)?;

    commit(&state, &request, &session.after_cart_checkout(), "cart").await
}

/// Buy now request.
#[derive(Debug, Deserialize)]
pub struct BuyNowRequest {
    /// Units to buy (default: 1).
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl Default for BuyNowRequest {
    fn default() -> Self {
        Self {
            quantity: default_quantity(),
        }
    }
}

/// Buy one product directly, bypassing the cart.
///
/// The body is optional: a request without a JSON body buys one unit. The
/// session's promo code applies and is consumed; the cart is left alone.
pub async fn buy_now(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
    Path(product_id): Path<ProductId>,
    body: Result<Json<BuyNowRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(JsonRejection::MissingJsonContentType(_)) => BuyNowRequest::default(),
        Err(rejection) => return Err(ApiError::BadRequest(rejection.body_text())),
    };

    let session = load_session(
        state.store.as_ref(),
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;
    let request = CheckoutRequest::single(auth.user_id, product_id, body.quantity, &session)?;

    commit(&state, &request, &session.after_direct_purchase(), "buy_now").await
}

async fn commit(
    state: &AppState,
    request: &CheckoutRequest,
    session_after: &Session,
    source: &'static str,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let receipt = state
        .store
        .commit_checkout(request, session_after)
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            if err.is_rejection() {
                tracing::warn!(
                    user_id = %request.user_id,
                    source,
                    lines = request.lines.len(),
                    error = %err,
                    "Checkout rejected"
                );
            }
            err
        })?;

    tracing::info!(
        user_id = %request.user_id,
        source,
        orders = receipt.orders.len(),
        total_cents = receipt.quote.total_cents,
        discount_cents = receipt.quote.discount_cents,
        balance_after_cents = receipt.balance_after_cents,
        "Checkout committed"
    );

    Ok(Json(CheckoutResponse::from(&receipt)))
}
