// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access/refresh token issuance and verification.
//!
//! Both tokens are HS256 JWTs signed with separate secrets. The refresh
//! token carries a random `jti` so every rotation yields a distinct value,
//! even within the same second.

use crate::config::Config;
use crate::db::UserStore;
use crate::error::AppError;
use crate::models::User;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TOKEN_ERROR: &str = "Something went wrong while generating refresh and access token";

/// Access token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Refresh token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Unique token ID
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
}

/// A freshly minted token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// `iat + ttl` as a JWT timestamp.
fn expires_at(now: usize, ttl: Duration) -> anyhow::Result<usize> {
    usize::try_from(ttl.as_secs())
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| anyhow::anyhow!("Token lifetime of {}s is out of range", ttl.as_secs()))
}

/// Signs and verifies session tokens.
pub struct TokenIssuer {
    access_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_secret: Vec<u8>,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &Config) -> Self {
        Self {
            access_secret: config.access_token_secret.clone(),
            access_ttl: config.access_token_expiry,
            refresh_secret: config.refresh_token_secret.clone(),
            refresh_ttl: config.refresh_token_expiry,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign a new access/refresh pair for `user`. Nothing is persisted.
    pub fn mint(&self, user: &User) -> anyhow::Result<TokenPair> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;
        let access_exp = expires_at(now, self.access_ttl)?;
        let refresh_exp = expires_at(now, self.refresh_ttl)?;

        let access = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat: now,
            exp: access_exp,
        };
        let refresh = RefreshClaims {
            sub: user.id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: refresh_exp,
        };

        let header = Header::new(Algorithm::HS256);
        Ok(TokenPair {
            access_token: encode(
                &header,
                &access,
                &EncodingKey::from_secret(&self.access_secret),
            )?,
            refresh_token: encode(
                &header,
                &refresh,
                &EncodingKey::from_secret(&self.refresh_secret),
            )?,
        })
    }

    /// Look up the user, mint a pair and persist the refresh token.
    ///
    /// Signing or persistence failures surface as a generic internal error;
    /// the cause is logged but never returned to the client.
    pub async fn issue_tokens(
        &self,
        store: &dyn UserStore,
        user_id: &str,
    ) -> Result<TokenPair, AppError> {
        let user = store
            .find_by_id(user_id)
            .await
            .map_err(|e| {
                tracing::error!(user_id, error = %e, "User lookup failed during token issue");
                AppError::internal(TOKEN_ERROR)
            })?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let pair = self.mint(&user).map_err(|e| {
            tracing::error!(user_id, error = %e, "Token signing failed");
            AppError::internal(TOKEN_ERROR)
        })?;

        store
            .set_refresh_token(user_id, Some(&pair.refresh_token))
            .await
            .map_err(|e| {
                tracing::error!(user_id, error = %e, "Failed to persist refresh token");
                AppError::internal(TOKEN_ERROR)
            })?;

        Ok(pair)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.access_secret),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Invalid access token".to_string()))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AppError> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(&self.refresh_secret),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Invalid refresh token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;

    fn test_user() -> User {
        User {
            id: "user-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            full_name: "Alice".to_string(),
            avatar: "http://localhost/a.png".to_string(),
            cover_image: None,
            refresh_token: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_mint_and_verify_roundtrip() {
        let issuer = TokenIssuer::new(&Config::test_default());
        let pair = issuer.mint(&test_user()).unwrap();

        let access = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(access.sub, "user-1");
        assert_eq!(access.username, "alice");
        assert!(access.exp > access.iat);

        let refresh = issuer.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, "user-1");
        assert!(refresh.exp - refresh.iat >= 10 * 24 * 60 * 60);
    }

    #[test]
    fn test_secrets_are_not_interchangeable() {
        let issuer = TokenIssuer::new(&Config::test_default());
        let pair = issuer.mint(&test_user()).unwrap();

        assert!(issuer.verify_access(&pair.refresh_token).is_err());
        assert!(issuer.verify_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn test_refresh_tokens_are_unique_per_mint() {
        let issuer = TokenIssuer::new(&Config::test_default());
        let user = test_user();

        let first = issuer.mint(&user).unwrap();
        let second = issuer.mint(&user).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
    }

    #[test]
    fn test_mint_rejects_out_of_range_lifetime() {
        let mut config = Config::test_default();
        config.refresh_token_expiry = Duration::from_secs(u64::MAX);
        let issuer = TokenIssuer::new(&config);

        assert!(issuer.mint(&test_user()).is_err());
    }

    #[tokio::test]
    async fn test_issue_tokens_out_of_range_lifetime_is_internal() {
        let mut config = Config::test_default();
        config.access_token_expiry = Duration::from_secs(u64::MAX);
        let issuer = TokenIssuer::new(&config);
        let store = MemoryDb::new();
        store.create_user(&test_user()).await.unwrap();

        let result = issuer.issue_tokens(&store, "user-1").await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        let stored = store.find_by_id("user-1").await.unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_issue_tokens_persists_refresh_token() {
        let issuer = TokenIssuer::new(&Config::test_default());
        let store = MemoryDb::new();
        store.create_user(&test_user()).await.unwrap();

        let pair = issuer.issue_tokens(&store, "user-1").await.unwrap();

        let stored = store.find_by_id("user-1").await.unwrap().unwrap();
        assert_eq!(stored.refresh_token, Some(pair.refresh_token));
    }

    #[tokio::test]
    async fn test_issue_tokens_unknown_user() {
        let issuer = TokenIssuer::new(&Config::test_default());
        let store = MemoryDb::new();

        let result = issuer.issue_tokens(&store, "nobody").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
