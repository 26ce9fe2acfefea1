//! Cart and promo-code handlers.
//!
//! The cart lives in the browser session. It is not checked against stock
//! until checkout, and lines whose product has been deleted are skipped when
//! the cart is shown.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use bazaar_core::money::format_cents;
use bazaar_core::{price_lines, Product, ProductId, Session};
use bazaar_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::session::{load_session, SessionHeader};
use crate::state::AppState;

/// One cart line.
#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    /// Product ID.
    pub product_id: String,
    /// Product title.
    pub title: String,
    /// Unit price in cents.
    pub unit_price_cents: i64,
    /// Units in the cart.
    pub quantity: u32,
    /// Units currently in stock.
    pub available: u32,
    /// Line price before discount.
    pub base_cents: i64,
    /// Line price after discount.
    pub charged_cents: i64,
}

/// Cart view with a price quote.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    /// Session the cart belongs to.
    pub session_id: String,
    /// Lines whose products still exist.
    pub items: Vec<CartItemResponse>,
    /// Applied promo code, if any.
    pub promo_code: Option<String>,
    /// Discount the promo grants.
    pub discount_percentage: Option<u8>,
    /// Total before discount.
    pub base_total_cents: i64,
    /// Amount taken off.
    pub discount_cents: i64,
    /// Total to pay.
    pub total_cents: i64,
    /// Total formatted as a decimal.
    pub total_formatted: String,
}

/// Price the session's cart against current product data.
pub(crate) async fn render_cart(
    store: &dyn Store,
    session: &Session,
) -> Result<CartResponse, ApiError> {
    let ids: Vec<ProductId> = session.cart.lines().map(|(id, _)| id).collect();
    let products = store.get_products(&ids).await?;
    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let lines: Vec<(&Product, u32)> = session
        .cart
        .lines()
        .filter_map(|(id, quantity)| by_id.get(&id).map(|p| (*p, quantity)))
        .collect();

    let discount = session.promo.as_ref().map(|p| p.discount);
    let quote = price_lines(&lines, discount)?;

    let items = quote
        .lines
        .iter()
        .map(|line| CartItemResponse {
            product_id: line.product_id.to_string(),
            title: line.title.clone(),
            unit_price_cents: line.unit_price_cents,
            quantity: line.quantity,
            available: by_id.get(&line.product_id).map_or(0, |p| p.count),
            base_cents: line.base_cents,
            charged_cents: line.charged_cents,
        })
        .collect();

    Ok(CartResponse {
        session_id: session.id.to_string(),
        items,
        promo_code: session.promo.as_ref().map(|p| p.code.clone()),
        discount_percentage: discount.map(|d| d.get()),
        base_total_cents: quote.base_total_cents,
        discount_cents: quote.discount_cents,
        total_cents: quote.total_cents,
        total_formatted: format_cents(quote.total_cents),
    })
}

/// Show the cart with a price quote.
pub async fn view_cart(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
) -> Result<Json<CartResponse>, ApiError> {
    let session = load_session(
        state.store.as_ref(),
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;
    Ok(Json(render_cart(state.store.as_ref(), &session).await?))
}

/// Add to cart request.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    /// Product ID.
    pub product_id: ProductId,
    /// Units to add (default: 1).
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

pub(crate) fn default_quantity() -> u32 {
    1
}

/// Add units of a product to the cart.
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let store = state.store.as_ref();
    if store.get_product(&body.product_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "product not found: {}",
            body.product_id
        )));
    }

    let mut session = load_session(
        store,
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;
    let quantity = session.cart.add(body.product_id, body.quantity)?;
    session.touch();
    store.put_session(&session).await?;

    tracing::debug!(
        session_id = %session.id,
        product_id = %body.product_id,
        quantity,
        "Cart line updated"
    );

    Ok(Json(render_cart(store, &session).await?))
}

/// Remove a product's line from the cart.
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartResponse>, ApiError> {
    let store = state.store.as_ref();
    let mut session = load_session(
        store,
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;

    if session.cart.remove(&product_id) {
        session.touch();
        store.put_session(&session).await?;
    }

    Ok(Json(render_cart(store, &session).await?))
}

/// Empty the cart. The applied promo code stays.
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
) -> Result<Json<CartResponse>, ApiError> {
    let store = state.store.as_ref();
    let mut session = load_session(
        store,
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;

    session.cart.clear();
    session.touch();
    store.put_session(&session).await?;

    Ok(Json(render_cart(store, &session).await?))
}

/// Apply promo request.
#[derive(Debug, Deserialize)]
pub struct ApplyPromoRequest {
    /// The code, matched case-insensitively.
    pub code: String,
}

/// Apply a promo code to the session.
///
/// An unknown, inactive or expired code clears any discount already applied.
pub async fn apply_promo(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
    Json(body): Json<ApplyPromoRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let store = state.store.as_ref();
    let mut session = load_session(
        store,
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;

    let redeemed = match store.find_promo_code(&body.code).await? {
        Some(promo) => promo.redeem(Utc::now()).map_err(ApiError::from),
        None => Err(ApiError::InvalidPromoCode(body.code.trim().to_string())),
    };

    match redeemed {
        Ok(applied) => {
            tracing::info!(
                session_id = %session.id,
                code = %applied.code,
                discount = applied.discount.get(),
                "Promo code applied"
            );
            session.promo = Some(applied);
            session.touch();
            store.put_session(&session).await?;
            Ok(Json(render_cart(store, &session).await?))
        }
        Err(err) => {
            tracing::warn!(session_id = %session.id, code = %body.code, "Promo code rejected");
            if session.promo.is_some() {
                session.clear_promo();
                store.put_session(&session).await?;
            }
            Err(err)
        }
    }
}

/// Drop the applied promo code.
pub async fn clear_promo(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    session: SessionHeader,
) -> Result<Json<CartResponse>, ApiError> {
    let store = state.store.as_ref();
    let mut session = load_session(
        store,
        session.for_user(&auth.user_id),
        &auth.user_id,
    )
    .await?;

    if session.promo.is_some() {
        session.clear_promo();
        store.put_session(&session).await?;
    }

    Ok(Json(render_cart(store, &session).await?))
}
