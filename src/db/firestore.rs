// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed credential store.
//!
//! Users live in the `users` collection keyed by their UUID. Uniqueness of
//! username/email and refresh-token rotation are enforced inside Firestore
//! transactions so that concurrent requests cannot both win.

use super::{collections, now_rfc3339, UserStore};
use crate::error::AppError;
use crate::models::{ImageSlot, User};
use async_trait::async_trait;
use firestore::{paths, FirestoreConsistencySelector, FirestoreTransaction};
use serde::{Deserialize, Serialize};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

// Field mask payloads: a write must only carry the fields it masks.

#[derive(Serialize, Deserialize)]
struct RefreshTokenPatch {
    refresh_token: Option<String>,
    updated_at: String,
}

#[derive(Serialize, Deserialize)]
struct PasswordPatch {
    password_hash: String,
    updated_at: String,
}

#[derive(Serialize, Deserialize)]
struct AvatarPatch {
    avatar: String,
    updated_at: String,
}

#[derive(Serialize, Deserialize)]
struct CoverImagePatch {
    cover_image: Option<String>,
    updated_at: String,
}

impl FirestoreDb {
    /// Create a new Firestore client for the given project and database.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, database_id: &str) -> Result<Self, AppError> {
        let options = firestore::FirestoreDbOptions::new(project_id.to_string())
            .with_database_id(database_id.to_string());

        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(options).await;
        }

        let client = firestore::FirestoreDb::with_options(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(
            project = project_id,
            database = database_id,
            "Connected to Firestore"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        options: firestore::FirestoreDbOptions,
    ) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!("Connected to Firestore (Emulator/Unauthenticated)");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a client with no connection (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn begin(&self) -> Result<(FirestoreTransaction<'_>, firestore::FirestoreDb), AppError> {
        let client = self.get_client()?;
        let transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reads through this handle register documents for conflict detection.
        let tx_db = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );

        Ok((transaction, tx_db))
    }

    async fn find_one_by(
        db: &firestore::FirestoreDb,
        field: &'static str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let value = value.to_string();
        let mut found: Vec<User> = db
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.field(field).eq(value.clone()))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(found.pop())
    }

    async fn get_in(db: &firestore::FirestoreDb, user_id: &str) -> Result<Option<User>, AppError> {
        db.fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl UserStore for FirestoreDb {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Self::get_in(self.get_client()?, user_id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Self::find_one_by(self.get_client()?, "username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Self::find_one_by(self.get_client()?, "email", email).await
    }

    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let (mut transaction, tx_db) = self.begin().await?;

        let taken = Self::find_one_by(&tx_db, "username", &user.username)
            .await?
            .is_some()
            || Self::find_one_by(&tx_db, "email", &user.email)
                .await?
                .is_some();

        if taken {
            let _ = transaction.rollback().await;
            return Err(AppError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add user to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::info!(user_id = %user.id, "User created");
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        user_id: &str,
        token: Option<&str>,
    ) -> Result<(), AppError> {
        let patch = RefreshTokenPatch {
            refresh_token: token.map(str::to_string),
            updated_at: now_rfc3339(),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{refresh_token, updated_at}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected: &str,
        new: &str,
    ) -> Result<bool, AppError> {
        let (mut transaction, tx_db) = self.begin().await?;

        let current = Self::get_in(&tx_db, user_id).await?;
        let still_current = current
            .as_ref()
            .and_then(|u| u.refresh_token.as_deref())
            .is_some_and(|stored| stored == expected);

        if !still_current {
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        let patch = RefreshTokenPatch {
            refresh_token: Some(new.to_string()),
            updated_at: now_rfc3339(),
        };

        self.get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{refresh_token, updated_at}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add token swap to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(true)
    }

    async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let patch = PasswordPatch {
            password_hash: password_hash.to_string(),
            updated_at: now_rfc3339(),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(User::{password_hash, updated_at}))
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_account(
        &self,
        user_id: &str,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let (mut transaction, tx_db) = self.begin().await?;

        let Some(mut user) = Self::get_in(&tx_db, user_id).await? else {
            let _ = transaction.rollback().await;
            return Ok(None);
        };

        if user.email != email {
            if let Some(owner) = Self::find_one_by(&tx_db, "email", email).await? {
                if owner.id != user_id {
                    let _ = transaction.rollback().await;
                    return Err(AppError::Conflict("Email is already in use".to_string()));
                }
            }
        }

        user.full_name = full_name.to_string();
        user.email = email.to_string();
        user.updated_at = now_rfc3339();

        self.get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add account update to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(Some(user))
    }

    async fn set_image(
        &self,
        user_id: &str,
        slot: ImageSlot,
        url: &str,
    ) -> Result<Option<User>, AppError> {
        if self.find_by_id(user_id).await?.is_none() {
            return Ok(None);
        }

        let updates = self.get_client()?.fluent().update();
        match slot {
            ImageSlot::Avatar => {
                updates
                    .fields(paths!(User::{avatar, updated_at}))
                    .in_col(collections::USERS)
                    .document_id(user_id)
                    .object(&AvatarPatch {
                        avatar: url.to_string(),
                        updated_at: now_rfc3339(),
                    })
                    .execute::<()>()
                    .await
            }
            ImageSlot::CoverImage => {
                updates
                    .fields(paths!(User::{cover_image, updated_at}))
                    .in_col(collections::USERS)
                    .document_id(user_id)
                    .object(&CoverImagePatch {
                        cover_image: Some(url.to_string()),
                        updated_at: now_rfc3339(),
                    })
                    .execute::<()>()
                    .await
            }
        }
        .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(user_id, field = slot.field(), "Profile image updated");
        self.find_by_id(user_id).await
    }
}
