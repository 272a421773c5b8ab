// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account workflows: register, login, logout, token refresh, password
//! change and profile edits.
//!
//! These functions know nothing about HTTP. Each one takes already-parsed
//! input, talks to the credential store, token issuer and media relay held
//! in [`AppState`], and returns a typed result. Cookie handling and the
//! response envelope live in `routes::users`.

use crate::db::now_rfc3339;
use crate::error::{AppError, Result};
use crate::models::{ImageSlot, PublicUser, User};
use crate::services::media::{relay_upload, StagedFile};
use crate::services::password::{hash_password, verify_password};
use crate::services::token::TokenPair;
use crate::AppState;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid user credentials";
const STALE_REFRESH_TOKEN: &str = "Refresh token is expired or used";

/// Registration form (text fields plus staged image files).
#[derive(Debug, Default, Validate)]
pub struct RegisterInput {
    pub full_name: String,
    #[validate(email(message = "Email is not valid"))]
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<StagedFile>,
    pub cover_image: Option<StagedFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateAccountInput {
    pub full_name: String,
    #[validate(email(message = "Email is not valid"))]
    pub email: String,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Create an account. Uniqueness is checked before any upload happens.
pub async fn register(state: &AppState, mut input: RegisterInput) -> Result<PublicUser> {
    if [
        &input.full_name,
        &input.email,
        &input.username,
        &input.password,
    ]
    .iter()
    .any(|field| is_blank(field))
    {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    input.email = normalize(&input.email);
    input.validate()?;
    let username = normalize(&input.username);

    if state
        .store
        .find_by_username_or_email(&username, &input.email)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "User with email or username already exists".to_string(),
        ));
    }

    let avatar_file = input
        .avatar
        .take()
        .ok_or_else(|| AppError::Validation("Avatar file is required".to_string()))?;

    let avatar = relay_upload(state.media.as_ref(), avatar_file, state.config.upload_timeout)
        .await?
        .ok_or_else(|| AppError::Validation("Avatar file could not be uploaded".to_string()))?;

    let cover_image = match input.cover_image.take() {
        Some(file) => {
            relay_upload(state.media.as_ref(), file, state.config.upload_timeout).await?
        }
        None => None,
    };

    let password_hash = hash_password(std::mem::take(&mut input.password)).await?;
    let now = now_rfc3339();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username,
        email: input.email,
        password_hash,
        full_name: input.full_name.trim().to_string(),
        avatar,
        cover_image,
        refresh_token: None,
        created_at: now.clone(),
        updated_at: now,
    };

    state.store.create_user(&user).await?;

    let created = state.store.find_by_id(&user.id).await?.ok_or_else(|| {
        tracing::error!(user_id = %user.id, "User missing right after create");
        AppError::internal("Something went wrong while registering the user")
    })?;

    tracing::info!(user_id = %created.id, "User registered");
    Ok(created.into())
}

/// Verify credentials and start a session.
///
/// Username, email and password are all required.
pub async fn login(state: &AppState, input: LoginInput) -> Result<LoginOutcome> {
    if is_blank(&input.username) || is_blank(&input.email) || input.password.is_empty() {
        return Err(AppError::Validation(
            "username, email and password are required".to_string(),
        ));
    }

    let user = state
        .store
        .find_by_username_or_email(&normalize(&input.username), &normalize(&input.email))
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(input.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Login rejected: wrong password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let tokens = state.tokens.issue_tokens(state.store.as_ref(), &user.id).await?;

    // Re-read so the returned profile reflects the stored record.
    let user = state
        .store
        .find_by_id(&user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(LoginOutcome {
        user: user.into(),
        tokens,
    })
}

/// End the session by clearing the stored refresh token.
pub async fn logout(state: &AppState, user_id: &str) -> Result<()> {
    state.store.set_refresh_token(user_id, None).await?;
    tracing::info!(user_id, "User logged out");
    Ok(())
}

/// Exchange a refresh token for a new pair, invalidating the presented one.
pub async fn refresh_access_token(state: &AppState, presented: Option<String>) -> Result<TokenPair> {
    let presented = presented
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?;

    let claims = state.tokens.verify_refresh(&presented)?;

    let user = state
        .store
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    let matches_stored = user
        .refresh_token
        .as_deref()
        .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(presented.as_bytes())));
    if !matches_stored {
        tracing::warn!(user_id = %user.id, "Stale refresh token presented");
        return Err(AppError::Unauthorized(STALE_REFRESH_TOKEN.to_string()));
    }

    let pair = state.tokens.mint(&user).map_err(|e| {
        tracing::error!(user_id = %user.id, error = %e, "Token signing failed");
        AppError::internal("Something went wrong while generating refresh and access token")
    })?;

    // Lost race: another request rotated this token first.
    if !state
        .store
        .swap_refresh_token(&user.id, &presented, &pair.refresh_token)
        .await?
    {
        tracing::warn!(user_id = %user.id, "Concurrent refresh lost the swap");
        return Err(AppError::Unauthorized(STALE_REFRESH_TOKEN.to_string()));
    }

    tracing::debug!(user_id = %user.id, "Refresh token rotated");
    Ok(pair)
}

pub async fn change_password(
    state: &AppState,
    user_id: &str,
    input: ChangePasswordInput,
) -> Result<()> {
    if input.old_password.is_empty() || input.new_password.is_empty() {
        return Err(AppError::Validation(
            "oldPassword and newPassword are required".to_string(),
        ));
    }

    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid access token".to_string()))?;

    if !verify_password(input.old_password, user.password_hash).await? {
        return Err(AppError::Validation("Invalid old password".to_string()));
    }

    let password_hash = hash_password(input.new_password).await?;
    state.store.set_password_hash(user_id, &password_hash).await?;

    tracing::info!(user_id, "Password changed");
    Ok(())
}

pub async fn update_account(
    state: &AppState,
    user_id: &str,
    mut input: UpdateAccountInput,
) -> Result<PublicUser> {
    if is_blank(&input.full_name) || is_blank(&input.email) {
        return Err(AppError::Validation("All fields are required".to_string()));
    }
    input.email = normalize(&input.email);
    input.validate()?;

    state
        .store
        .update_account(user_id, input.full_name.trim(), &input.email)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Replace the avatar or cover image with a newly uploaded file.
pub async fn update_image(
    state: &AppState,
    user_id: &str,
    slot: ImageSlot,
    file: Option<StagedFile>,
) -> Result<PublicUser> {
    let file = file
        .ok_or_else(|| AppError::Validation(format!("The {} file is missing", slot.label())))?;

    let url = relay_upload(state.media.as_ref(), file, state.config.upload_timeout)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!("Error while uploading the {}", slot.label()))
        })?;

    state
        .store
        .set_image(user_id, slot, &url)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}
