// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT compatibility tests.
//!
//! These tests decode tokens minted by `TokenIssuer` with plain
//! `jsonwebtoken` calls, catching claim-format or algorithm changes that
//! would break other services verifying the same tokens.

use accounts_api::config::Config;
use accounts_api::models::User;
use accounts_api::services::TokenIssuer;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Access claims as an external verifier sees them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessClaims {
    sub: String,
    email: String,
    username: String,
    full_name: String,
    exp: usize,
    iat: usize,
}

#[derive(Debug, Deserialize)]
struct RefreshClaims {
    sub: String,
    exp: usize,
    iat: usize,
}

fn test_user() -> User {
    User {
        id: "3f1c9a52-7f0e-4a55-9d35-5c2d1f0d6a11".to_string(),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        password_hash: "$argon2id$placeholder".to_string(),
        full_name: "Alice Liddell".to_string(),
        avatar: "https://media.example.com/a.png".to_string(),
        cover_image: None,
        refresh_token: None,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

#[test]
fn test_access_token_claims() {
    let config = Config::test_default();
    let pair = TokenIssuer::new(&config).mint(&test_user()).unwrap();

    let token_data = decode::<AccessClaims>(
        &pair.access_token,
        &DecodingKey::from_secret(&config.access_token_secret),
        &Validation::new(Algorithm::HS256),
    )
    .expect("Failed to decode access token - check claims compatibility");

    let claims = token_data.claims;
    assert_eq!(claims.sub, test_user().id);
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.full_name, "Alice Liddell");
    assert_eq!(claims.exp - claims.iat, 15 * 60);
}

#[test]
fn test_refresh_token_claims() {
    let config = Config::test_default();
    let pair = TokenIssuer::new(&config).mint(&test_user()).unwrap();

    let token_data = decode::<RefreshClaims>(
        &pair.refresh_token,
        &DecodingKey::from_secret(&config.refresh_token_secret),
        &Validation::new(Algorithm::HS256),
    )
    .expect("Failed to decode refresh token");

    assert_eq!(token_data.claims.sub, test_user().id);
    assert!(token_data.claims.iat <= now());

    // Refresh tokens outlive access tokens (10 days in the test config).
    assert!(
        token_data.claims.exp > now() + 86400 * 9,
        "Refresh token expiration should be ~10 days in the future"
    );
}

#[test]
fn test_refresh_token_carries_no_profile_data() {
    let config = Config::test_default();
    let pair = TokenIssuer::new(&config).mint(&test_user()).unwrap();

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    let token_data = decode::<serde_json::Value>(
        &pair.refresh_token,
        &DecodingKey::from_secret(&config.refresh_token_secret),
        &validation,
    )
    .unwrap();

    let claims = token_data.claims;
    assert!(claims.get("email").is_none());
    assert!(claims.get("username").is_none());
}

#[test]
fn test_expired_access_token_rejected() {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let config = Config::test_default();
    let issuer = TokenIssuer::new(&config);

    let stale = serde_json::json!({
        "sub": "user-1",
        "email": "alice@example.com",
        "username": "alice",
        "fullName": "Alice",
        "iat": now() - 7200,
        "exp": now() - 3600,
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &stale,
        &EncodingKey::from_secret(&config.access_token_secret),
    )
    .unwrap();

    assert!(issuer.verify_access(&token).is_err());
}
