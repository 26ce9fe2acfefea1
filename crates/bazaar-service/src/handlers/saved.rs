//! Saved-product and recently-viewed handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use bazaar_core::{Product, ProductId};

use super::catalog::ProductResponse;
use super::SearchQuery;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::session::{browsing_session, SessionHeader};
use crate::state::AppState;

/// Toggle response.
#[derive(Debug, Serialize)]
pub struct ToggleSavedResponse {
    /// Product ID.
    pub product_id: String,
    /// Whether the product is saved now.
    pub saved: bool,
}

/// Save a product, or unsave it if it is already saved.
pub async fn toggle_saved(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(product_id): Path<ProductId>,
) -> Result<Json<ToggleSavedResponse>, ApiError> {
    let saved = state
        .store
        .toggle_saved(&auth.user_id, &product_id)
        .await?;

    tracing::info!(user_id = %auth.user_id, product_id = %product_id, saved, "Saved toggled");

    Ok(Json(ToggleSavedResponse {
        product_id: product_id.to_string(),
        saved,
    }))
}

/// List saved products, optionally filtered by title.
pub async fn list_saved(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.store.list_saved(&auth.user_id).await?;
    Ok(Json(filter_by_title(&products, query.q.as_deref())))
}

/// List products viewed in this session, optionally filtered by title.
///
/// Deleted products drop out silently. Without a session the list is empty.
/// Naming another user's session is forbidden.
pub async fn list_recently_viewed(
    State(state): State<Arc<AppState>>,
    auth: Option<AuthUser>,
    session: SessionHeader,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let user_id = auth.as_ref().map(|a| &a.user_id);
    let Some(session) = browsing_session(state.store.as_ref(), &session, user_id).await? else {
        return Ok(Json(Vec::new()));
    };

    let products = state.store.get_products(&session.recently_viewed).await?;
    Ok(Json(filter_by_title(&products, query.q.as_deref())))
}

fn filter_by_title(products: &[Product], query: Option<&str>) -> Vec<ProductResponse> {
    let query = query.map(str::trim).filter(|q| !q.is_empty());
    products
        .iter()
        .filter(|p| query.map_or(true, |q| p.title_contains(q)))
        .map(ProductResponse::from)
        .collect()
}
