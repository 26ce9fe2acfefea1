//! Order history handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use bazaar_core::OrderId;

use super::checkout::OrderResponse;
use super::PageQuery;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// List orders response.
#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    /// Orders (newest first).
    pub orders: Vec<OrderResponse>,
    /// Whether there are more orders.
    pub has_more: bool,
}

/// List order history.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit();
    let orders = state
        .store
        .list_orders(&auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = orders.len() > limit;
    let orders = orders
        .iter()
        .take(limit)
        .map(OrderResponse::from)
        .collect();

    Ok(Json(ListOrdersResponse { orders, has_more }))
}

/// Remove one order from the user's history.
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_order(&auth.user_id, &order_id)
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            if err.is_rejection() {
                tracing::warn!(
                    user_id = %auth.user_id,
                    order_id = %order_id,
                    error = %err,
                    "Order delete rejected"
                );
            }
            err
        })?;

    tracing::info!(user_id = %auth.user_id, order_id = %order_id, "Order deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Clear orders response.
#[derive(Debug, Serialize)]
pub struct ClearOrdersResponse {
    /// Number of orders removed.
    pub removed: usize,
}

/// Remove the user's whole order history.
pub async fn clear_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ClearOrdersResponse>, ApiError> {
    let removed = state.store.clear_orders(&auth.user_id).await?;

    tracing::info!(user_id = %auth.user_id, removed, "Order history cleared");

    Ok(Json(ClearOrdersResponse { removed }))
}
