//! Deposit request handlers.
//!
//! Users ask for a top-up here; an operator confirms it through the admin
//! routes, which is when the balance is credited.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::money::format_cents;
use bazaar_core::Deposit;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Deposit response.
#[derive(Debug, Serialize)]
pub struct DepositResponse {
    /// Deposit ID.
    pub id: String,
    /// Owner.
    pub user_id: String,
    /// Amount in cents.
    pub amount_cents: i64,
    /// Amount formatted as a decimal.
    pub amount_formatted: String,
    /// Whether the balance has been credited.
    pub is_confirmed: bool,
    /// Request timestamp.
    pub created_at: String,
    /// Confirmation timestamp.
    pub confirmed_at: Option<String>,
}

impl From<&Deposit> for DepositResponse {
    fn from(deposit: &Deposit) -> Self {
        Self {
            id: deposit.id.to_string(),
            user_id: deposit.user_id.to_string(),
            amount_cents: deposit.amount_cents,
            amount_formatted: format_cents(deposit.amount_cents),
            is_confirmed: deposit.is_confirmed,
            created_at: deposit.created_at.to_rfc3339(),
            confirmed_at: deposit.confirmed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Deposit request body.
#[derive(Debug, Deserialize)]
pub struct RequestDepositRequest {
    /// Amount as a decimal, e.g. `"100.00"`.
    pub amount: Decimal,
}

/// Ask for a balance top-up.
pub async fn request_deposit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RequestDepositRequest>,
) -> Result<(StatusCode, Json<DepositResponse>), ApiError> {
    let deposit = Deposit::request(auth.user_id, body.amount)?;
    state.store.create_deposit(&deposit).await?;

    tracing::info!(
        user_id = %auth.user_id,
        deposit_id = %deposit.id,
        amount_cents = deposit.amount_cents,
        "Deposit requested"
    );

    Ok((StatusCode::CREATED, Json(DepositResponse::from(&deposit))))
}

/// List the user's deposits, newest first.
pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<DepositResponse>>, ApiError> {
    let deposits = state.store.list_deposits(&auth.user_id).await?;
    Ok(Json(deposits.iter().map(DepositResponse::from).collect()))
}
