// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image catalog: collections are the immediate subfolders of the photos root

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::CatalogConfig;
use crate::{RefineError, Result};

/// Source of folder and image listings
pub trait ImageCatalog: Send + Sync {
    /// Folders that contain at least one image, case-insensitive name order
    fn list_collections(&self) -> Result<Vec<String>>;

    /// Image filenames in a folder, case-insensitive name order
    fn list_images(&self, folder: &str) -> Result<Vec<String>>;

    /// Absolute path of an image inside a folder
    fn image_path(&self, folder: &str, name: &str) -> Result<PathBuf>;

    /// First image by name, used as the collection cover
    fn cover_image(&self, folder: &str) -> Result<Option<String>> {
        Ok(self.list_images(folder)?.into_iter().next())
    }
}

/// Catalog backed by a directory on disk
#[derive(Debug, Clone)]
pub struct FsCatalog {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>, config: &CatalogConfig) -> Self {
        Self {
            root: root.into(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a path has an allowed image extension
    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn collection_dir(&self, folder: &str) -> Result<PathBuf> {
        validate_segment(folder, "collection")?;
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Err(RefineError::NotFound(format!("collection {:?}", folder)));
        }
        Ok(dir)
    }

    fn images_in(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || !self.is_image(&path) {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) if is_plain_segment(name) => names.push(name.to_string()),
                _ => debug!("Skipping unservable filename: {:?}", path),
            }
        }
        sort_names(&mut names);
        Ok(names)
    }
}

impl ImageCatalog for FsCatalog {
    fn list_collections(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut collections = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str());
            let Some(name) = name.filter(|n| is_plain_segment(n)) else {
                debug!("Skipping unservable folder: {:?}", path);
                continue;
            };
            if !self.images_in(&path)?.is_empty() {
                collections.push(name.to_string());
            }
        }
        sort_names(&mut collections);
        Ok(collections)
    }

    fn list_images(&self, folder: &str) -> Result<Vec<String>> {
        let dir = self.collection_dir(folder)?;
        self.images_in(&dir)
    }

    fn image_path(&self, folder: &str, name: &str) -> Result<PathBuf> {
        validate_segment(name, "image")?;
        let path = self.collection_dir(folder)?.join(name);
        if !path.is_file() || !self.is_image(&path) {
            return Err(RefineError::NotFound(format!("image {}/{}", folder, name)));
        }
        Ok(path)
    }
}

/// Case-insensitive name order, ties broken by exact bytes so the order is total
pub fn sort_names(names: &mut [String]) {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
}

/// A single path component that can be listed, stored and served back.
/// Listing and lookup share this rule.
pub fn is_plain_segment(segment: &str) -> bool {
    !(segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']))
}

/// Reject anything that is not a single plain path component
pub fn validate_segment(segment: &str, what: &str) -> Result<()> {
    if !is_plain_segment(segment) {
        return Err(RefineError::InvalidInput(format!("invalid {} name {:?}", what, segment)));
    }
    Ok(())
}
