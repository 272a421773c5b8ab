// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! accounts-api: user registration, login and session-token management
//!
//! This crate provides a small REST backend for account management: users
//! register with a profile image, log in to receive an access/refresh token
//! pair (also set as cookies), rotate the refresh token, and edit their
//! profile. Records live in Firestore; images go to a media upload service.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;

use anyhow::Context;
use config::{Config, MediaBackend, StoreBackend};
use db::{FirestoreDb, MemoryDb, UserStore};
use services::{CloudinaryRelay, LocalMediaRelay, MediaRelay, TokenIssuer};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub media: Arc<dyn MediaRelay>,
    pub tokens: TokenIssuer,
}

impl AppState {
    /// Connect the configured store and media relay and prepare the upload
    /// staging directory.
    pub async fn initialize(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn UserStore> = match config.store_backend {
            StoreBackend::Firestore => Arc::new(
                FirestoreDb::new(&config.gcp_project_id, &config.database_name).await?,
            ),
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory credential store; data is not persisted");
                Arc::new(MemoryDb::new())
            }
        };

        let media: Arc<dyn MediaRelay> = match &config.media_backend {
            MediaBackend::Cloudinary {
                cloud_name,
                api_key,
                api_secret,
            } => Arc::new(CloudinaryRelay::new(
                cloud_name.clone(),
                api_key.clone(),
                api_secret.clone(),
                config.upload_timeout,
            )?),
            MediaBackend::Local { dir, base_url } => {
                Arc::new(LocalMediaRelay::new(dir.clone(), base_url.clone()))
            }
        };

        tokio::fs::create_dir_all(&config.upload_staging_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create upload staging dir {}",
                    config.upload_staging_dir.display()
                )
            })?;

        Ok(Arc::new(Self {
            tokens: TokenIssuer::new(&config),
            config,
            store,
            media,
        }))
    }
}
