// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT authentication middleware (session gate).

use crate::error::AppError;
use crate::models::User;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "accesstoken";
/// Cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Authenticated user resolved from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub user: User,
}

/// Extract a token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve an access token into a live user.
pub async fn authenticate(state: &AppState, token: Option<&str>) -> Result<AuthUser, AppError> {
    let token = token.ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?;

    let claims = state.tokens.verify_access(token)?;

    let user = state
        .store
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid access token".to_string()))?;

    Ok(AuthUser {
        user_id: user.id.clone(),
        user,
    })
}

/// Middleware that requires valid JWT authentication.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(request.headers()).map(str::to_string));

    let auth_user = authenticate(&state, token.as_deref()).await?;
    tracing::debug!(user_id = %auth_user.user_id, "Request authenticated");

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
