//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use bazaar_core::{money::format_cents, MarketError};
use bazaar_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - acting on another user's resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Not enough units in stock.
    #[error("insufficient stock for {title}: available={available}, requested={requested}")]
    InsufficientStock {
        /// Product ID.
        product_id: String,
        /// Product title.
        title: String,
        /// Units in stock.
        available: u32,
        /// Units requested.
        requested: u32,
    },

    /// Balance does not cover the total.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// Unknown, inactive or expired promo code.
    #[error("invalid or inactive promo code: {0}")]
    InvalidPromoCode(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientStock {
                product_id,
                title,
                available,
                requested,
            } => (
                StatusCode::CONFLICT,
                "insufficient_stock",
                format!("Not enough \"{title}\" in stock: {available} available, {requested} requested"),
                Some(serde_json::json!({
                    "product_id": product_id,
                    "available": available,
                    "requested": requested
                })),
            ),
            Self::InsufficientFunds { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_funds",
                format!(
                    "Insufficient funds: balance {}, required {}",
                    format_cents(*balance),
                    format_cents(*required)
                ),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::InvalidPromoCode(code) => (
                StatusCode::BAD_REQUEST,
                "invalid_promo_code",
                format!("Promo code {code} is invalid or inactive"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        match err {
            MarketError::NotFound { .. } => Self::NotFound(err.to_string()),
            MarketError::InsufficientStock {
                product_id,
                title,
                available,
                requested,
            } => Self::InsufficientStock {
                product_id,
                title,
                available,
                requested,
            },
            MarketError::InsufficientFunds {
                balance_cents,
                required_cents,
            } => Self::InsufficientFunds {
                balance: balance_cents,
                required: required_cents,
            },
            MarketError::InvalidInput(msg) => Self::BadRequest(msg),
            MarketError::InvalidId(e) => Self::BadRequest(e.to_string()),
            MarketError::InvalidPromoCode { code } => Self::InvalidPromoCode(code),
            MarketError::Forbidden(msg) => Self::Forbidden(msg),
            MarketError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(rejection) => rejection.into(),
            StoreError::Database(_) | StoreError::Serialization(_) | StoreError::Corrupt { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl ApiError {
    /// Whether this error is a rejected business operation rather than a fault.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_faults_become_internal() {
        let err: ApiError = StoreError::Database("connection reset".into()).into();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(!err.is_rejection());
    }

    #[test]
    fn rejections_keep_their_details() {
        let err: ApiError = StoreError::Rejected(MarketError::InsufficientFunds {
            balance_cents: 1_000,
            required_cents: 3_000,
        })
        .into();
        assert!(matches!(
            err,
            ApiError::InsufficientFunds {
                balance: 1_000,
                required: 3_000
            }
        ));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn stock_rejection_is_conflict() {
        let err: ApiError = MarketError::InsufficientStock {
            product_id: "p".into(),
            title: "Lamp".into(),
            available: 5,
            requested: 10,
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
