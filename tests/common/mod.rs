// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use accounts_api::config::Config;
use accounts_api::db::{FirestoreDb, MemoryDb};
use accounts_api::routes::create_router;
use accounts_api::services::{MediaRelay, TokenIssuer, UploadedMedia};
use accounts_api::AppState;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Connect to the Firestore emulator.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", "(default)")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app on the in-memory store and local media relay.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let state = AppState::initialize(Config::test_default())
        .await
        .expect("Failed to build test state");
    (create_router(state.clone()), state)
}

/// Create a test app whose media relay is `media`. Uploads time out after
/// 200ms.
#[allow(dead_code)]
pub fn create_test_app_with_relay(media: Arc<dyn MediaRelay>) -> (axum::Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.upload_timeout = Duration::from_millis(200);

    let state = Arc::new(AppState {
        tokens: TokenIssuer::new(&config),
        config,
        store: Arc::new(MemoryDb::new()),
        media,
    });
    (create_router(state.clone()), state)
}

/// Relay whose upload service is down.
#[allow(dead_code)]
pub struct FailingRelay;

#[async_trait]
impl MediaRelay for FailingRelay {
    async fn upload(&self, _: &Path) -> anyhow::Result<UploadedMedia> {
        anyhow::bail!("503 Service Unavailable")
    }
}

/// Relay that accepts the file but hands back no URL.
#[allow(dead_code)]
pub struct EmptyUrlRelay;

#[async_trait]
impl MediaRelay for EmptyUrlRelay {
    async fn upload(&self, _: &Path) -> anyhow::Result<UploadedMedia> {
        Ok(UploadedMedia {
            url: String::new(),
            public_id: "empty".to_string(),
        })
    }
}

/// Relay that never answers.
#[allow(dead_code)]
pub struct HangingRelay;

#[async_trait]
impl MediaRelay for HangingRelay {
    async fn upload(&self, _: &Path) -> anyhow::Result<UploadedMedia> {
        std::future::pending::<()>().await;
        anyhow::bail!("unreachable")
    }
}

/// Store a user with password "correct horse" directly, bypassing the
/// upload path.
#[allow(dead_code)]
pub async fn seed_user(state: &AppState, username: &str, email: &str) -> String {
    let now = chrono::Utc::now().to_rfc3339();
    let user = accounts_api::models::User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: accounts_api::services::password::hash_password(
            "correct horse".to_string(),
        )
        .await
        .unwrap(),
        full_name: "Seeded User".to_string(),
        avatar: "http://localhost:8080/media/original.png".to_string(),
        cover_image: None,
        refresh_token: None,
        created_at: now.clone(),
        updated_at: now,
    };
    state.store.create_user(&user).await.unwrap();
    user.id
}

/// Minimal multipart/form-data body builder.
#[allow(dead_code)]
pub struct MultipartBody {
    boundary: String,
    buf: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "----accounts-api-test-boundary".to_string(),
            buf: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                self.boundary, name, file_name
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.buf
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (self.content_type(), self.buf)
    }
}

/// Registration form for a user with the given handle.
#[allow(dead_code)]
pub fn registration_form(username: &str, email: &str) -> MultipartBody {
    MultipartBody::new()
        .text("fullName", "Test User")
        .text("email", email)
        .text("username", username)
        .text("password", "correct horse")
        .file("avatar", "avatar.png", b"\x89PNG fake avatar")
}

#[allow(dead_code)]
pub fn multipart_request(method: &str, uri: &str, body: MultipartBody) -> Request<Body> {
    let (content_type, bytes) = body.finish();
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .unwrap()
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Add an `Authorization: Bearer` header to a request.
#[allow(dead_code)]
pub fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

/// Send a request through a clone of the router.
#[allow(dead_code)]
pub async fn send(app: &axum::Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// Register a user and return the response status.
#[allow(dead_code)]
pub async fn register(app: &axum::Router, username: &str, email: &str) -> StatusCode {
    send(
        app,
        multipart_request(
            "POST",
            "/api/v1/users/register",
            registration_form(username, email),
        ),
    )
    .await
    .status()
}

/// Log in and return `(access_token, refresh_token)`.
#[allow(dead_code)]
pub async fn login(app: &axum::Router, username: &str, email: &str) -> (String, String) {
    let response = send(
        app,
        json_request(
            "POST",
            "/api/v1/users/login",
            serde_json::json!({
                "username": username,
                "email": email,
                "password": "correct horse",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    (
        body["data"]["accessToken"].as_str().unwrap().to_string(),
        body["data"]["refreshToken"].as_str().unwrap().to_string(),
    )
}

/// Recursively assert that no user object in a JSON value leaks secrets.
#[allow(dead_code)]
pub fn assert_no_secrets(value: &Value) {
    match value {
        Value::Object(map) => {
            for forbidden in ["password", "passwordHash", "password_hash", "refresh_token"] {
                assert!(
                    !map.contains_key(forbidden),
                    "response leaks {forbidden}: {value}"
                );
            }
            // A user object carries `_id`; it must never hold the refresh token.
            if map.contains_key("_id") {
                assert!(!map.contains_key("refreshToken"), "user leaks refreshToken");
            }
            map.values().for_each(assert_no_secrets);
        }
        Value::Array(items) => items.iter().for_each(assert_no_secrets),
        _ => {}
    }
}
