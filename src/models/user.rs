//! User model for storage and API.

use serde::{Deserialize, Serialize};

/// User account stored in the credential store.
///
/// Never serialized into an API response directly; use [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// UUID (also used as document ID)
    pub id: String,
    /// Lower-cased, unique
    pub username: String,
    /// Lower-cased, unique
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub full_name: String,
    /// Avatar URL from the media relay
    pub avatar: String,
    pub cover_image: Option<String>,
    /// The single live refresh token, if any
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Sanitized user as returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Which profile image a media upload replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Avatar,
    CoverImage,
}

impl ImageSlot {
    /// Name of the multipart field carrying the file.
    pub fn form_field(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar",
            ImageSlot::CoverImage => "coverImage",
        }
    }

    /// Human-readable name used in messages.
    pub fn label(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar",
            ImageSlot::CoverImage => "cover image",
        }
    }

    /// Stored field name.
    pub fn field(self) -> &'static str {
        match self {
            ImageSlot::Avatar => "avatar",
            ImageSlot::CoverImage => "cover_image",
        }
    }
}
