//! Operator handlers, authenticated by API key.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::money::format_cents;
use bazaar_core::{Category, DepositId, DiscountPercent, PromoCode};

use super::catalog::CategoryResponse;
use super::deposits::DepositResponse;
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Create category request.
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    /// Display name, unique case-insensitively.
    pub name: String,
}

/// Create a category.
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let category = Category::new(&body.name)?;
    state.store.create_category(&category).await?;

    tracing::info!(category_id = %category.id, name = %category.name, "Category created");

    Ok((StatusCode::CREATED, Json(CategoryResponse::from(&category))))
}

/// Promo code response.
#[derive(Debug, Serialize)]
pub struct PromoCodeResponse {
    /// The code.
    pub code: String,
    /// Percentage off.
    pub discount_percentage: u8,
    /// Whether the code can be applied.
    pub is_active: bool,
    /// Expiry, if any.
    pub valid_until: Option<String>,
}

impl From<&PromoCode> for PromoCodeResponse {
    fn from(promo: &PromoCode) -> Self {
        Self {
            code: promo.code.clone(),
            discount_percentage: promo.discount_percentage.get(),
            is_active: promo.is_active,
            valid_until: promo.valid_until.map(|t| t.to_rfc3339()),
        }
    }
}

/// Create promo code request.
#[derive(Debug, Deserialize)]
pub struct CreatePromoCodeRequest {
    /// The code.
    pub code: String,
    /// Percentage off, 1-100.
    pub discount_percentage: u8,
    /// Optional expiry.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Create a promo code.
pub async fn create_promo_code(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<CreatePromoCodeRequest>,
) -> Result<(StatusCode, Json<PromoCodeResponse>), ApiError> {
    let discount = DiscountPercent::try_from(body.discount_percentage)?;
    let promo = PromoCode::new(&body.code, discount, body.valid_until)?;
    state.store.create_promo_code(&promo).await?;

    tracing::info!(code = %promo.code, discount = discount.get(), "Promo code created");

    Ok((StatusCode::CREATED, Json(PromoCodeResponse::from(&promo))))
}

/// Deactivate a promo code. Sessions holding it keep their discount.
pub async fn deactivate_promo_code(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(code): Path<String>,
) -> Result<Json<PromoCodeResponse>, ApiError> {
    let promo = state.store.set_promo_code_active(&code, false).await?;

    tracing::info!(code = %promo.code, "Promo code deactivated");

    Ok(Json(PromoCodeResponse::from(&promo)))
}

/// List unconfirmed deposits, oldest first.
pub async fn list_pending_deposits(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<Vec<DepositResponse>>, ApiError> {
    let deposits = state.store.list_pending_deposits().await?;
    Ok(Json(deposits.iter().map(DepositResponse::from).collect()))
}

/// Confirm deposit response.
#[derive(Debug, Serialize)]
pub struct ConfirmDepositResponse {
    /// The deposit after confirmation.
    pub deposit: DepositResponse,
    /// Whether this call credited the balance.
    pub credited: bool,
    /// Owner's balance in cents.
    pub balance_cents: i64,
    /// Owner's balance formatted as a decimal.
    pub balance_formatted: String,
}

/// Confirm a deposit and credit its owner. Repeating the call credits nothing.
pub async fn confirm_deposit(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(deposit_id): Path<DepositId>,
) -> Result<Json<ConfirmDepositResponse>, ApiError> {
    let confirmation = state.store.confirm_deposit(&deposit_id).await?;

    if confirmation.credited {
        tracing::info!(
            deposit_id = %deposit_id,
            user_id = %confirmation.deposit.user_id,
            amount_cents = confirmation.deposit.amount_cents,
            balance_after_cents = confirmation.balance_after_cents,
            "Deposit confirmed"
        );
    } else {
        tracing::warn!(deposit_id = %deposit_id, "Deposit already confirmed, nothing credited");
    }

    Ok(Json(ConfirmDepositResponse {
        deposit: DepositResponse::from(&confirmation.deposit),
        credited: confirmation.credited,
        balance_cents: confirmation.balance_after_cents,
        balance_formatted: format_cents(confirmation.balance_after_cents),
    }))
}
