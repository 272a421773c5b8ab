// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Media relay: turns a staged local file into a durable public URL.
//!
//! Two relays are provided:
//! - `CloudinaryRelay` posts a signed upload to Cloudinary
//! - `LocalMediaRelay` copies into a directory served under a base URL
//!
//! Uploaded files are first staged on disk as a [`StagedFile`], which
//! removes itself when dropped, so the staging area is cleaned up on every
//! path, success or failure.

use crate::error::AppError;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A relay that accepts a local file and returns where it now lives.
#[async_trait]
pub trait MediaRelay: Send + Sync {
    async fn upload(&self, local_path: &Path) -> anyhow::Result<UploadedMedia>;
}

/// Result of a successful relay call.
#[derive(Debug, Clone)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
}

/// A file written to the staging directory, deleted on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Write `bytes` into `dir` under a fresh name keeping the original
    /// extension.
    pub async fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create staging dir {}", dir.display()))?;

        let name = match extension_of(original_name) {
            Some(ext) => format!("{}.{}", uuid::Uuid::new_v4(), ext),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let path = dir.join(name);

        // Construct first so a failed write still removes any partial file.
        let staged = Self { path };
        tokio::fs::write(&staged.path, bytes)
            .await
            .with_context(|| format!("Failed to stage upload {}", staged.path.display()))?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

/// Lower-cased alphanumeric extension of a client-supplied file name.
fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

/// Push a staged file through the relay with a deadline.
///
/// Returns `Ok(None)` when the relay fails or hands back an empty URL; the
/// caller decides how to report that. A timeout is an internal error. The
/// staged file is removed before returning.
pub async fn relay_upload(
    relay: &dyn MediaRelay,
    file: StagedFile,
    timeout: Duration,
) -> Result<Option<String>, AppError> {
    let outcome = tokio::time::timeout(timeout, relay.upload(file.path())).await;
    drop(file);

    match outcome {
        Err(_) => {
            tracing::error!(timeout_secs = timeout.as_secs(), "Media upload timed out");
            Err(AppError::internal("Media upload timed out"))
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Media upload failed");
            Ok(None)
        }
        Ok(Ok(media)) if media.url.is_empty() => Ok(None),
        Ok(Ok(media)) => {
            tracing::debug!(public_id = %media.public_id, "Media uploaded");
            Ok(Some(media.url))
        }
    }
}

// ─── Cloudinary ──────────────────────────────────────────────

/// Signed uploads to Cloudinary's `auto` resource endpoint.
pub struct CloudinaryRelay {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CloudinaryUpload {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct CloudinaryErrorBody {
    error: CloudinaryErrorDetail,
}

#[derive(Deserialize)]
struct CloudinaryErrorDetail {
    message: String,
}

impl CloudinaryRelay {
    pub fn new(
        cloud_name: String,
        api_key: String,
        api_secret: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            cloud_name,
            api_key,
            api_secret,
            client,
        })
    }

    /// Cloudinary signature: SHA-256 over the sorted params followed by the secret.
    fn sign(&self, timestamp: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("timestamp={}{}", timestamp, self.api_secret));
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl MediaRelay for CloudinaryRelay {
    async fn upload(&self, local_path: &Path) -> anyhow::Result<UploadedMedia> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", self.sign(timestamp));

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/auto/upload",
            self.cloud_name
        );

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<CloudinaryErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            anyhow::bail!("Cloudinary upload failed ({}): {}", status, message);
        }

        let body: CloudinaryUpload = response.json().await?;
        Ok(UploadedMedia {
            url: body.secure_url,
            public_id: body.public_id,
        })
    }
}

// ─── Local directory ─────────────────────────────────────────

/// Copies uploads into `dir` and serves them as `{base_url}/{name}`.
pub struct LocalMediaRelay {
    dir: PathBuf,
    base_url: String,
}

impl LocalMediaRelay {
    pub fn new(dir: PathBuf, base_url: String) -> Self {
        Self {
            dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaRelay for LocalMediaRelay {
    async fn upload(&self, local_path: &Path) -> anyhow::Result<UploadedMedia> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Staged file has no usable name")?
            .to_string();

        tokio::fs::copy(local_path, self.dir.join(&name))
            .await
            .with_context(|| format!("Failed to copy {}", local_path.display()))?;

        Ok(UploadedMedia {
            url: format!("{}/{}", self.base_url, name),
            public_id: name,
        })
    }
}
