// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User account routes under `/api/v1/users`.
//!
//! Thin HTTP adapters: parse the request, call the workflow in
//! `services::accounts`, then wrap the result in the response envelope and
//! set or clear the session cookies.

use crate::error::{AppError, Result};
use crate::middleware::auth::{require_auth, AuthUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::models::{ImageSlot, PublicUser};
use crate::response::ApiResponse;
use crate::services::accounts::{
    self, ChangePasswordInput, LoginInput, LoginOutcome, RegisterInput, UpdateAccountInput,
};
use crate::services::{StagedFile, TokenPair};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        State,
    },
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    let public_routes = Router::new()
        .route("/register", post(register).layer(upload_limit))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_access_token));

    let protected_routes = Router::new()
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/update-avatar", patch(update_avatar).layer(upload_limit))
        .route(
            "/update-cover-image",
            patch(update_cover_image).layer(upload_limit),
        )
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public_routes.merge(protected_routes)
}

// ─── Cookies ─────────────────────────────────────────────────

fn session_cookie(name: &'static str, value: String, ttl: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .build()
}

fn with_session(jar: CookieJar, state: &AppState, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        state.tokens.access_ttl(),
    ))
    .add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        state.tokens.refresh_ttl(),
    ))
}

fn without_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/"))
}

// ─── Multipart ───────────────────────────────────────────────

/// Text fields and staged files from a multipart body.
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl UploadForm {
    fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }

    fn file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

/// Drain a multipart body, staging every non-empty file part on disk.
async fn read_form(mut multipart: Multipart, staging_dir: &Path) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                let staged = StagedFile::write(staging_dir, &file_name, &bytes).await?;
                form.files.insert(name, staged);
            }
            None => {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

// ─── Handlers ────────────────────────────────────────────────

async fn register(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>> {
    let mut form = read_form(multipart?, &state.config.upload_staging_dir).await?;

    let input = RegisterInput {
        full_name: form.text("fullName"),
        email: form.text("email"),
        username: form.text("username"),
        password: form.text("password"),
        avatar: form.file(ImageSlot::Avatar.form_field()),
        cover_image: form.file(ImageSlot::CoverImage.form_field()),
    };

    let user = accounts::register(&state, input).await?;

    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    payload: std::result::Result<Json<LoginInput>, JsonRejection>,
) -> Result<(CookieJar, ApiResponse<LoginOutcome>)> {
    let Json(input) = payload?;
    let outcome = accounts::login(&state, input).await?;

    let jar = with_session(jar, &state, &outcome.tokens);
    Ok((jar, ApiResponse::ok(outcome, "User logged in successfully")))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<serde_json::Value>)> {
    accounts::logout(&state, &user.user_id).await?;

    Ok((
        without_session(jar),
        ApiResponse::ok(serde_json::json!({}), "User logged out"),
    ))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: Option<String>,
}

/// Token comes from the cookie, else from an optional JSON body.
async fn refresh_access_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokenPair>)> {
    let presented = match jar.get(REFRESH_TOKEN_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => Some(cookie.value().to_string()),
        _ if body.is_empty() => None,
        _ => {
            serde_json::from_slice::<RefreshBody>(&body)
                .map_err(|e| AppError::Validation(format!("Invalid JSON body: {}", e)))?
                .refresh_token
        }
    };

    let tokens = accounts::refresh_access_token(&state, presented).await?;

    let jar = with_session(jar, &state, &tokens);
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed")))
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<ChangePasswordInput>, JsonRejection>,
) -> Result<ApiResponse<serde_json::Value>> {
    let Json(input) = payload?;
    accounts::change_password(&state, &user.user_id, input).await?;

    Ok(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    ))
}

/// Returns the user resolved by the session gate; never writes.
async fn current_user(Extension(user): Extension<AuthUser>) -> ApiResponse<PublicUser> {
    ApiResponse::ok(
        PublicUser::from(user.user),
        "Current user fetched successfully",
    )
}

async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: std::result::Result<Json<UpdateAccountInput>, JsonRejection>,
) -> Result<ApiResponse<PublicUser>> {
    let Json(input) = payload?;
    let updated = accounts::update_account(&state, &user.user_id, input).await?;

    Ok(ApiResponse::ok(
        updated,
        "Account details updated successfully",
    ))
}

async fn update_image(
    state: &AppState,
    user: &AuthUser,
    slot: ImageSlot,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>> {
    let mut form = read_form(multipart?, &state.config.upload_staging_dir).await?;
    let updated =
        accounts::update_image(state, &user.user_id, slot, form.file(slot.form_field())).await?;

    Ok(ApiResponse::ok(
        updated,
        format!("The {} was updated successfully", slot.label()),
    ))
}

async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>> {
    update_image(&state, &user, ImageSlot::Avatar, multipart).await
}

async fn update_cover_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<PublicUser>> {
    update_image(&state, &user, ImageSlot::CoverImage, multipart).await
}
