//! Account, balance and ledger handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use bazaar_core::money::format_cents;
use bazaar_core::{Account, LedgerEntry, NewAccount, ProfileUpdate};

use super::{require_account, PageQuery};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Telegram handle.
    pub tg_username: String,
    /// Current balance in cents.
    pub balance_cents: i64,
    /// Balance formatted as a decimal.
    pub balance_formatted: String,
    /// Lifetime confirmed deposits in cents.
    pub lifetime_deposited_cents: i64,
    /// Lifetime purchases in cents.
    pub lifetime_spent_cents: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            username: account.username.clone(),
            phone_number: account.phone_number.clone(),
            tg_username: account.tg_username.clone(),
            balance_cents: account.balance_cents,
            balance_formatted: format_cents(account.balance_cents),
            lifetime_deposited_cents: account.lifetime_deposited_cents,
            lifetime_spent_cents: account.lifetime_spent_cents,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create an account for the authenticated user.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<NewAccount>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let account = Account::new(auth.user_id, body)?;
    state.store.create_account(&account).await?;

    tracing::info!(user_id = %auth.user_id, "Account created");

    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}

/// Update the current user's profile.
///
/// Omitted fields are left unchanged. Usernames are unique ignoring case.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.store.update_profile(&auth.user_id, &body).await?;

    tracing::info!(user_id = %auth.user_id, "Profile updated");

    Ok(Json(AccountResponse::from(&account)))
}

/// What other users see of an account.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    /// Display name.
    pub username: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Telegram handle.
    pub tg_username: String,
    /// Member since.
    pub created_at: String,
}

/// Look up another user's profile by username.
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let account = state
        .store
        .find_account_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No user named {username}")))?;

    Ok(Json(ProfileResponse {
        username: account.username,
        phone_number: account.phone_number,
        tg_username: account.tg_username,
        created_at: account.created_at.to_rfc3339(),
    }))
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Balance in cents.
    pub balance_cents: i64,
    /// Balance formatted as a decimal.
    pub balance_formatted: String,
}

/// Get current balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(BalanceResponse {
        balance_cents: account.balance_cents,
        balance_formatted: format_cents(account.balance_cents),
    }))
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry ID.
    pub id: String,
    /// Amount in cents (positive = credit, negative = debit).
    pub amount_cents: i64,
    /// Entry kind.
    pub kind: &'static str,
    /// Balance after this entry.
    pub balance_after_cents: i64,
    /// Description.
    pub description: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerEntry> for LedgerEntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            amount_cents: entry.amount_cents,
            kind: entry.kind.as_str(),
            balance_after_cents: entry.balance_after_cents,
            description: entry.description.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// List ledger entries response.
#[derive(Debug, Serialize)]
pub struct ListEntriesResponse {
    /// Entries (newest first).
    pub entries: Vec<LedgerEntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List balance history.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListEntriesResponse>, ApiError> {
    require_account(state.store.as_ref(), &auth.user_id).await?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit();
    let entries = state
        .store
        .list_ledger_entries(&auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = entries.len() > limit;
    let entries = entries
        .iter()
        .take(limit)
        .map(LedgerEntryResponse::from)
        .collect();

    Ok(Json(ListEntriesResponse { entries, has_more }))
}
