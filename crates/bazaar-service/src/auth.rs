//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - End-user authentication via HS256 JWT
//! - `AdminAuth` - Operator authentication via API key
//!
//! Identity is issued elsewhere; the service only checks tokens.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use bazaar_core::UserId;

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Prefix of the development token format `test-token:<user-uuid>`.
pub const TEST_TOKEN_PREFIX: &str = "test-token:";

/// An authenticated user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// The raw subject claim from the token.
    pub subject: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        verify_token(token.trim(), &state.config)
    }
}

/// Resolve a bearer token to a user.
///
/// # Errors
///
/// Returns [`ApiError::Unauthorized`] if the token is malformed, expired,
/// signed with the wrong key, or meant for another audience.
pub fn verify_token(token: &str, config: &ServiceConfig) -> Result<AuthUser, ApiError> {
    if let Some(subject) = token.strip_prefix(TEST_TOKEN_PREFIX) {
        if !config.allow_test_tokens {
            tracing::debug!("Rejected test token: test tokens are disabled");
            return Err(ApiError::Unauthorized);
        }
        return user_from_subject(subject);
    }

    let secret = config.jwt_secret.as_deref().ok_or(ApiError::Unauthorized)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.auth_audience.as_str()]);

    let data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    user_from_subject(&data.claims.sub)
}

fn user_from_subject(subject: &str) -> Result<AuthUser, ApiError> {
    let user_id = subject
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(AuthUser {
        user_id,
        subject: subject.to_string(),
    })
}

/// Operator authentication via the `x-api-key` header.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if api_key != expected_key {
            tracing::warn!("Rejected admin request with wrong API key");
            return Err(ApiError::Unauthorized);
        }

        Ok(AdminAuth)
    }
}

/// JWT claims accepted from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user UUID).
    pub sub: String,
    /// Audience.
    pub aud: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}
