//! Category, product and comment handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::money::{cents_from_decimal, format_cents};
use bazaar_core::{
    average_rating, Category, CategoryId, Comment, CommentId, NewProduct, Product, ProductId,
    ProductUpdate,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::session::{browsing_session, SessionHeader};
use crate::state::AppState;

// =============================================================================
// Categories
// =============================================================================

/// Category response.
#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    /// Category ID.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl From<&Category> for CategoryResponse {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.to_string(),
            name: category.name.clone(),
        }
    }
}

/// List all categories by name.
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = state.store.list_categories().await?;
    Ok(Json(categories.iter().map(CategoryResponse::from).collect()))
}

// =============================================================================
// Products
// =============================================================================

/// Product response.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    /// Product ID.
    pub id: String,
    /// Seller.
    pub author_id: String,
    /// Category ID.
    pub category_id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Unit price in cents.
    pub price_cents: i64,
    /// Unit price formatted as a decimal.
    pub price_formatted: String,
    /// Pickup address.
    pub address: String,
    /// Seller phone number.
    pub phone_number: String,
    /// Seller Telegram handle.
    pub tg_username: String,
    /// Units in stock.
    pub count: u32,
    /// Created timestamp.
    pub created_at: String,
    /// Updated timestamp.
    pub updated_at: String,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            author_id: product.author_id.to_string(),
            category_id: product.category_id.to_string(),
            title: product.title.clone(),
            description: product.description.clone(),
            price_cents: product.price_cents,
            price_formatted: format_cents(product.price_cents),
            address: product.address.clone(),
            phone_number: product.phone_number.clone(),
            tg_username: product.tg_username.clone(),
            count: product.count,
            created_at: product.created_at.to_rfc3339(),
            updated_at: product.updated_at.to_rfc3339(),
        }
    }
}

/// Create product request. Prices are decimals, e.g. `"10.00"`.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    /// Category ID.
    pub category_id: CategoryId,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Pickup address.
    #[serde(default)]
    pub address: String,
    /// Seller phone number.
    #[serde(default)]
    pub phone_number: String,
    /// Seller Telegram handle.
    #[serde(default)]
    pub tg_username: String,
    /// Units in stock (default: 1).
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// List a product for sale.
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let fields = NewProduct {
        category_id: body.category_id,
        title: body.title,
        description: body.description,
        price_cents: cents_from_decimal(body.price)?,
        address: body.address,
        phone_number: body.phone_number,
        tg_username: body.tg_username,
        count: body.count,
    };
    let product = Product::new(auth.user_id, fields)?;
    state.store.create_product(&product).await?;

    tracing::info!(
        user_id = %auth.user_id,
        product_id = %product.id,
        price_cents = product.price_cents,
        count = product.count,
        "Product listed"
    );

    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// Comment response.
#[derive(Debug, Serialize)]
pub struct CommentResponse {
    /// Comment ID.
    pub id: String,
    /// Author.
    pub author_id: String,
    /// Text.
    pub body: String,
    /// Rating 1-5, or 0 when unrated.
    pub rating: u8,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Comment> for CommentResponse {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id.to_string(),
            author_id: comment.author_id.to_string(),
            body: comment.body.clone(),
            rating: comment.rating,
            created_at: comment.created_at.to_rfc3339(),
        }
    }
}

/// Product detail response.
#[derive(Debug, Serialize)]
pub struct ProductDetailResponse {
    /// The product.
    pub product: ProductResponse,
    /// Comments, newest first.
    pub comments: Vec<CommentResponse>,
    /// Mean of the rated comments, 0 when none are rated.
    pub average_rating: f64,
}

/// Show a product with its comments.
///
/// Records the view in the caller's session. Anonymous views are only
/// recorded into a session that already exists.
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    auth: Option<AuthUser>,
    session: SessionHeader,
    Path(product_id): Path<ProductId>,
) -> Result<Json<ProductDetailResponse>, ApiError> {
    let product = state
        .store
        .get_product(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("product not found: {product_id}")))?;

    let comments = state.store.list_comments(&product_id).await?;

    let user_id = auth.as_ref().map(|a| &a.user_id);
    if let Some(mut session) = browsing_session(state.store.as_ref(), &session, user_id).await? {
        if session.record_view(product_id) {
            state.store.put_session(&session).await?;
        }
    }

    tracing::debug!(product_id = %product_id, comments = comments.len(), "Product viewed");

    Ok(Json(ProductDetailResponse {
        product: ProductResponse::from(&product),
        average_rating: average_rating(&comments),
        comments: comments.iter().map(CommentResponse::from).collect(),
    }))
}

/// Update product request. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    /// New category.
    pub category_id: Option<CategoryId>,
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New unit price.
    pub price: Option<Decimal>,
    /// New address.
    pub address: Option<String>,
    /// New phone number.
    pub phone_number: Option<String>,
    /// New Telegram handle.
    pub tg_username: Option<String>,
    /// New stock level.
    pub count: Option<u32>,
}

/// Edit a product. Only its author may.
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(product_id): Path<ProductId>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let update = ProductUpdate {
        category_id: body.category_id,
        title: body.title,
        description: body.description,
        price_cents: body.price.map(cents_from_decimal).transpose()?,
        address: body.address,
        phone_number: body.phone_number,
        tg_username: body.tg_username,
        count: body.count,
    };

    let product = state
        .store
        .update_product(&product_id, &auth.user_id, &update)
        .await?;

    tracing::info!(user_id = %auth.user_id, product_id = %product_id, "Product updated");

    Ok(Json(ProductResponse::from(&product)))
}

/// Delete a product with its comments and saves. Orders keep their snapshot.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_product(&product_id, &auth.user_id)
        .await?;

    tracing::info!(user_id = %auth.user_id, product_id = %product_id, "Product deleted");

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Comments
// =============================================================================

/// Add comment request.
#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    /// Text.
    pub body: String,
    /// Rating 1-5; omit or send 0 for none.
    #[serde(default)]
    pub rating: u8,
}

/// Comment on a product.
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(product_id): Path<ProductId>,
    Json(body): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let comment = Comment::new(product_id, auth.user_id, &body.body, body.rating)?;
    state.store.add_comment(&comment).await?;

    tracing::info!(
        user_id = %auth.user_id,
        product_id = %product_id,
        rating = comment.rating,
        "Comment added"
    );

    Ok((StatusCode::CREATED, Json(CommentResponse::from(&comment))))
}

/// Delete a comment. Only its author may.
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((product_id, comment_id)): Path<(ProductId, CommentId)>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_comment(&product_id, &comment_id, &auth.user_id)
        .await?;

    tracing::info!(user_id = %auth.user_id, comment_id = %comment_id, "Comment deleted");

    Ok(StatusCode::NO_CONTENT)
}
