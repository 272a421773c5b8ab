//! Credential store (Firestore in production, in-memory for dev and tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{ImageSlot, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// Persistence for user accounts.
///
/// Implementations must keep username and email unique, and must make
/// `create_user` and `swap_refresh_token` atomic with respect to concurrent
/// callers.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AppError>;

    /// Look up by (already lower-cased) username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Look up by (already lower-cased) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Insert a new user. Fails with `AppError::Conflict` if the username or
    /// email is taken; nothing is written in that case.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    /// Unconditionally overwrite (or clear) the stored refresh token.
    async fn set_refresh_token(&self, user_id: &str, token: Option<&str>)
        -> Result<(), AppError>;

    /// Replace the stored refresh token only if it still equals `expected`.
    ///
    /// Returns `false` when the user is gone or the stored token differs.
    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, AppError>;

    async fn set_password_hash(&self, user_id: &str, password_hash: &str)
        -> Result<(), AppError>;

    /// Update full name and email. Fails with `AppError::Conflict` if the
    /// email belongs to another user. Returns `None` if the user is gone.
    async fn update_account(
        &self,
        user_id: &str,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, AppError>;

    /// Store a new image URL. Returns `None` if the user is gone.
    async fn set_image(
        &self,
        user_id: &str,
        slot: ImageSlot,
        url: &str,
    ) -> Result<Option<User>, AppError>;

    /// Username match wins over email match.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        if let Some(user) = self.find_by_username(username).await? {
            return Ok(Some(user));
        }
        self.find_by_email(email).await
    }
}

/// Current time in the format stored on user records.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
