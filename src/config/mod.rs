// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for photo-refine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Root folder whose subfolders are the collections
    #[serde(default = "default_photos_dir")]
    pub photos_dir: PathBuf,

    /// Directory for the database and thumbnail cache
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Image listing settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Thumbnail cache settings
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    /// Refinement rules
    #[serde(default)]
    pub refine: RefineConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogConfig {
    /// Allowed file extensions, lowercase, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThumbnailConfig {
    /// Cache directory; `<data_dir>/thumbs` when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Bounding box edge in pixels
    #[serde(default = "default_thumb_size")]
    pub size: u32,
    /// JPEG quality (1-100)
    #[serde(default = "default_thumb_quality")]
    pub quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RefineConfig {
    /// Only allow refining a refinement once it is complete
    #[serde(default)]
    pub require_complete_source: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Database file; `<data_dir>/app.sqlite` when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_photos_dir() -> PathBuf { PathBuf::from("photos") }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_thumb_size() -> u32 { 512 }
fn default_thumb_quality() -> u8 { 85 }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8000 }

fn default_extensions() -> Vec<String> {
    vec!["jpg", "jpeg", "png", "webp", "bmp"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            photos_dir: default_photos_dir(),
            data_dir: default_data_dir(),
            catalog: CatalogConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            refine: RefineConfig::default(),
            web: WebConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            dir: None,
            size: default_thumb_size(),
            quality: default_thumb_quality(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| crate::RefineError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `PHOTOS_DIR` and `DATA_DIR` take precedence over the file
    pub fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os("PHOTOS_DIR") {
            self.photos_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.thumbnails.size == 0 {
            return Err(crate::RefineError::Config("thumbnails.size must be positive".to_string()));
        }
        if !(1..=100).contains(&self.thumbnails.quality) {
            return Err(crate::RefineError::Config(
                "thumbnails.quality must be between 1 and 100".to_string(),
            ));
        }
        if self.catalog.extensions.is_empty() {
            return Err(crate::RefineError::Config(
                "catalog.extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("app.sqlite"))
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.thumbnails
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("thumbs"))
    }
}
