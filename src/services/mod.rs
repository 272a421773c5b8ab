// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accounts;
pub mod media;
pub mod password;
pub mod token;

pub use media::{CloudinaryRelay, LocalMediaRelay, MediaRelay, StagedFile, UploadedMedia};
pub use token::{AccessClaims, RefreshClaims, TokenIssuer, TokenPair};
