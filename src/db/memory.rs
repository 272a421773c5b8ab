// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process credential store for local development and tests.
//!
//! Uniqueness is enforced through two secondary indexes (username → id,
//! email → id) that are reserved with `DashMap` entries before the user
//! document is inserted.

use super::{now_rfc3339, UserStore};
use crate::error::AppError;
use crate::models::{ImageSlot, User};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, User>,
    usernames: DashMap<String, String>,
    emails: DashMap<String, String>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn reserve(index: &DashMap<String, String>, key: &str, user_id: &str) -> bool {
        match index.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(user_id.to_string());
                true
            }
        }
    }

    fn update<F>(&self, user_id: &str, apply: F) -> Option<User>
    where
        F: FnOnce(&mut User),
    {
        let mut entry = self.users.get_mut(user_id)?;
        let user = entry.value_mut();
        apply(user);
        user.updated_at = now_rfc3339();
        Some(user.clone())
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.usernames.get(username).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.emails.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        if !Self::reserve(&self.usernames, &user.username, &user.id) {
            return Err(AppError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }
        if !Self::reserve(&self.emails, &user.email, &user.id) {
            self.usernames.remove(&user.username);
            return Err(AppError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }

        self.users.insert(user.id.clone(), user.clone());
        tracing::debug!(user_id = %user.id, "User created (memory)");
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        user_id: &str,
        token: Option<&str>,
    ) -> Result<(), AppError> {
        self.update(user_id, |user| user.refresh_token = token.map(str::to_string))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, AppError> {
        // The entry guard serializes concurrent swaps on the same user.
        let Some(mut user) = self.users.get_mut(user_id) else {
            return Ok(false);
        };
        if user.refresh_token.as_deref() != Some(expected) {
            return Ok(false);
        }
        user.refresh_token = Some(new.to_string());
        user.updated_at = now_rfc3339();
        Ok(true)
    }

    async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), AppError> {
        self.update(user_id, |user| user.password_hash = password_hash.to_string())
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    async fn update_account(
        &self,
        user_id: &str,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let Some(old_email) = self.users.get(user_id).map(|u| u.email.clone()) else {
            return Ok(None);
        };

        let email_changed = old_email != email;
        if email_changed && !Self::reserve(&self.emails, email, user_id) {
            return Err(AppError::Conflict("Email is already in use".to_string()));
        }

        let updated = self.update(user_id, |user| {
            user.full_name = full_name.to_string();
            user.email = email.to_string();
        });

        if email_changed {
            match updated {
                Some(_) => self.emails.remove(&old_email),
                None => self.emails.remove(email),
            };
        }

        Ok(updated)
    }

    async fn set_image(
        &self,
        user_id: &str,
        slot: ImageSlot,
        url: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self.update(user_id, |user| match slot {
            ImageSlot::Avatar => user.avatar = url.to_string(),
            ImageSlot::CoverImage => user.cover_image = Some(url.to_string()),
        }))
    }
}
