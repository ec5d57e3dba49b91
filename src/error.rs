// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for photo-refine

use thiserror::Error;

/// Result type alias for photo-refine operations
pub type Result<T> = std::result::Result<T, RefineError>;

/// photo-refine error types
#[derive(Error, Debug)]
pub enum RefineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Refinement chain loops back to refinement {0}")]
    CycleDetected(i64),

    #[error("Refinement {refinement_id} has a malformed source key {source_key:?}")]
    CorruptChain { refinement_id: i64, source_key: String },

    #[error("Refinement chain starting at {0} exceeds {1} links")]
    ChainTooDeep(i64, usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RefineError {
    /// True for errors the user can fix by changing their request.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RefineError::NotFound(_) | RefineError::InvalidInput(_) | RefineError::InvalidState(_)
        )
    }

    /// True for failures that mean the stored refinement chain is broken.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            RefineError::CycleDetected(_)
                | RefineError::CorruptChain { .. }
                | RefineError::ChainTooDeep(..)
        )
    }
}
