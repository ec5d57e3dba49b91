// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! photo-refine: self-hosted photo curation
//!
//! Browse folders of images, swipe yes/no/skip through them, and refine the
//! yes pile again until only favorites are left.

pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gallery;
pub mod thumbs;
pub mod web;

pub use config::AppConfig;
pub use error::{RefineError, Result};
